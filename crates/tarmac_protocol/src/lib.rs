//! Shared data model for Tarmac.
//!
//! Every crate in the workspace speaks in these types: a [`Period`] is one unit
//! of work, a [`DownloadOutcome`] is the immutable record of one attempt at it.
//! The [`Clock`] and [`CancellationToken`] primitives live here so that the
//! watcher, the WebDriver helpers and the session loop all wait and stop the
//! same way.

pub mod cancel;
pub mod clock;
pub mod defaults;
pub mod paths;
pub mod types;

pub use cancel::CancellationToken;
pub use clock::{Clock, ManualClock, SystemClock};
pub use types::{DownloadOutcome, DownloadStatus, Period, PeriodError, SelectedField, MONTH_NAMES};
