//! Tarmac: batch downloader for the BTS On-Time Performance export form.
//!
//! For every month in a range, a [`DownloadAttempt`] fills the form through a
//! browser, waits for the export to land in the download directory and records
//! the outcome in the provenance ledger. [`SessionController`] sequences the
//! attempts.

pub mod attempt;
pub mod config;
pub mod fields;
pub mod session;

pub use attempt::{AttemptError, AttemptSettings, DownloadAttempt};
pub use config::{ConfigError, ResolvedPaths, TarmacConfig};
pub use fields::{plan_selection, select_fields, Control, FieldSelection};
pub use session::{plan_periods, ConfirmHook, SessionController, SessionOptions, SessionTally};
