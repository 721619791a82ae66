//! Provenance ledger for Tarmac download sessions.
//!
//! The ledger is the durable audit trail of a session: one entry per download
//! attempt, plus a summary written when the session ends.
//!
//! # Key Properties
//!
//! - **Full rewrite per append**: every [`ProvenanceLedger::record`] persists the
//!   whole document, so the file on disk is always complete JSON and a crash
//!   loses at most the attempt in flight
//! - **Atomic replace**: writes go to a sibling file first and are renamed over
//!   the ledger
//! - **Idempotent sealing**: sealing overwrites the summary fields, it never
//!   appends; sealing twice leaves `downloads` untouched
//! - **Guaranteed finalization**: [`LedgerGuard`] seals on drop, so early
//!   returns and panics still leave a sealed ledger behind
//!
//! # Example
//!
//! ```no_run
//! use tarmac_ledger::{LedgerGuard, ProvenanceLedger, SessionMetadata};
//! use std::path::Path;
//!
//! let ledger = ProvenanceLedger::create(Path::new("provenance"), SessionMetadata::default()).unwrap();
//! let mut guard = LedgerGuard::new(ledger);
//! // ... guard.record(&outcome) once per attempt ...
//! guard.seal(0, 0).unwrap();
//! ```

mod report;

pub use report::render_summary;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use tarmac_protocol::defaults::{DEFAULT_DATASET, DEFAULT_DATA_SOURCE, DEFAULT_SOURCE_URL};
use tarmac_protocol::{DownloadOutcome, DownloadStatus};
use thiserror::Error;
use tracing::{error, info, warn};

const LEDGER_PREFIX: &str = "provenance_log_";
const SUMMARY_PREFIX: &str = "download_summary_";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Fixed identifiers recorded once per session.
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub source_url: String,
    pub data_source: String,
    pub dataset: String,
    pub tool_version: String,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            dataset: DEFAULT_DATASET.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `session_info` block of the persisted ledger.
///
/// `end_time` and the three counters stay absent until the ledger is sealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub start_time: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Local>>,
    pub tool_version: String,
    pub platform: String,
    pub source_url: String,
    pub data_source: String,
    pub dataset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_downloads_attempted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_downloads: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_downloads: Option<u64>,
}

/// One element of `downloads[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadEntry {
    pub timestamp: DateTime<Local>,
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub fields_selected: Vec<String>,
    pub num_fields: usize,
    pub status: DownloadStatus,
    pub download_filename: Option<String>,
    pub file_size_bytes: Option<u64>,
    pub error_message: Option<String>,
}

impl DownloadEntry {
    fn from_outcome(outcome: &DownloadOutcome, timestamp: DateTime<Local>) -> Self {
        let period = outcome.period();
        let fields_selected: Vec<String> = outcome
            .fields_selected()
            .iter()
            .map(|f| f.as_str().to_string())
            .collect();
        Self {
            timestamp,
            year: period.year(),
            month: period.month(),
            month_name: period.month_name().to_string(),
            num_fields: fields_selected.len(),
            fields_selected,
            status: outcome.status(),
            download_filename: outcome.filename().map(String::from),
            file_size_bytes: outcome.size_bytes(),
            error_message: outcome.error().map(String::from),
        }
    }
}

/// The whole persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerDocument {
    pub session_info: SessionInfo,
    pub downloads: Vec<DownloadEntry>,
}

impl LedgerDocument {
    /// (successful, failed) counts derived from the recorded entries.
    pub fn tally(&self) -> (u64, u64) {
        let succeeded = self
            .downloads
            .iter()
            .filter(|d| d.status.is_success())
            .count() as u64;
        (succeeded, self.downloads.len() as u64 - succeeded)
    }
}

/// Session-scoped, append-only ledger persisted as pretty JSON.
pub struct ProvenanceLedger {
    dir: PathBuf,
    stamp: String,
    path: PathBuf,
    document: LedgerDocument,
}

impl ProvenanceLedger {
    /// Create a ledger in `dir` named after the current local time and persist it.
    pub fn create(dir: &Path, metadata: SessionMetadata) -> Result<Self, LedgerError> {
        Self::create_at(dir, metadata, Local::now())
    }

    /// Create a ledger for a session that started at `start_time`.
    pub fn create_at(
        dir: &Path,
        metadata: SessionMetadata,
        start_time: DateTime<Local>,
    ) -> Result<Self, LedgerError> {
        fs::create_dir_all(dir).map_err(|e| LedgerError::io(dir, e))?;

        let stamp = start_time.format(STAMP_FORMAT).to_string();
        let path = dir.join(format!("{}{}.json", LEDGER_PREFIX, stamp));

        let ledger = Self {
            dir: dir.to_path_buf(),
            stamp,
            path,
            document: LedgerDocument {
                session_info: SessionInfo {
                    start_time,
                    end_time: None,
                    tool_version: metadata.tool_version,
                    platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
                    source_url: metadata.source_url,
                    data_source: metadata.data_source,
                    dataset: metadata.dataset,
                    total_downloads_attempted: None,
                    successful_downloads: None,
                    failed_downloads: None,
                },
                downloads: Vec::new(),
            },
        };
        ledger.persist()?;
        info!("Provenance ledger: {}", ledger.path.display());
        Ok(ledger)
    }

    /// Read a persisted ledger back.
    pub fn load(path: &Path) -> Result<LedgerDocument, LedgerError> {
        let bytes = fs::read(path).map_err(|e| LedgerError::io(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &LedgerDocument {
        &self.document
    }

    pub fn len(&self) -> usize {
        self.document.downloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.downloads.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.document.session_info.end_time.is_some()
    }

    /// Path of the human-readable report written by [`seal`](Self::seal).
    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}.txt", SUMMARY_PREFIX, self.stamp))
    }

    /// Append one outcome and persist the full ledger.
    pub fn record(&mut self, outcome: &DownloadOutcome) -> Result<(), LedgerError> {
        self.document
            .downloads
            .push(DownloadEntry::from_outcome(outcome, Local::now()));
        self.persist()
    }

    /// Write the session summary fields and the human-readable report.
    ///
    /// Overwrites any previous summary; `downloads` is never touched.
    pub fn seal(&mut self, succeeded: u64, failed: u64) -> Result<PathBuf, LedgerError> {
        let info = &mut self.document.session_info;
        info.end_time = Some(Local::now());
        info.total_downloads_attempted = Some(succeeded + failed);
        info.successful_downloads = Some(succeeded);
        info.failed_downloads = Some(failed);
        self.persist()?;

        let summary_path = self.summary_path();
        let summary = render_summary(&self.document);
        write_atomically(&summary_path, summary.as_bytes())?;
        info!("Summary saved to: {}", summary_path.display());
        Ok(summary_path)
    }

    fn persist(&self) -> Result<(), LedgerError> {
        let bytes = serde_json::to_vec_pretty(&self.document)?;
        write_atomically(&self.path, &bytes)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".partial");
    let staging = PathBuf::from(staging);

    let mut file = File::create(&staging).map_err(|e| LedgerError::io(&staging, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| LedgerError::io(&staging, e))?;
    drop(file);

    fs::rename(&staging, path).map_err(|e| LedgerError::io(path, e))
}

/// Exclusive owner of the session ledger that seals it on every exit path.
///
/// Call [`seal`](Self::seal) with the controller's counts on the normal path.
/// If the guard is dropped unsealed (early return, `?`, panic unwinding), it
/// seals with counts derived from the recorded entries.
pub struct LedgerGuard {
    ledger: ProvenanceLedger,
}

impl LedgerGuard {
    pub fn new(ledger: ProvenanceLedger) -> Self {
        Self { ledger }
    }

    pub fn seal(&mut self, succeeded: u64, failed: u64) -> Result<PathBuf, LedgerError> {
        self.ledger.seal(succeeded, failed)
    }
}

impl Deref for LedgerGuard {
    type Target = ProvenanceLedger;

    fn deref(&self) -> &Self::Target {
        &self.ledger
    }
}

impl DerefMut for LedgerGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ledger
    }
}

impl Drop for LedgerGuard {
    fn drop(&mut self) {
        if self.ledger.is_sealed() {
            return;
        }
        let (succeeded, failed) = self.ledger.document().tally();
        warn!(
            "Sealing ledger on abnormal exit ({} succeeded, {} failed)",
            succeeded, failed
        );
        if let Err(e) = self.ledger.seal(succeeded, failed) {
            error!("Failed to seal provenance ledger {}: {}", self.ledger.path().display(), e);
        }
    }
}
