//! Download completion detection.
//!
//! A browser-initiated download gives no completion signal, so the only
//! evidence is the download directory itself: a `*.crdownload` artifact while
//! bytes are arriving, then a new finished file. `*.tmp` names are never
//! finished files but do not mark a download in progress either.
//!
//! ```text
//!   Pending ──(.crdownload seen)──▶ InProgress
//!      │                                  │
//!      └──(none in flight, new file)──▶ Done ◀──┘
//!      └──(elapsed ≥ timeout, final diff empty)──▶ TimedOut
//! ```
//!
//! The directory is read through [`DirectoryListing`] so tests can script what
//! the watcher sees, and all waiting goes through a [`Clock`].

mod listing;

pub use listing::{DirEntry, DirectoryListing, FsListing};

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tarmac_protocol::defaults::{
    DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS, IN_PROGRESS_SUFFIX,
    TEMPORARY_SUFFIXES,
};
use tarmac_protocol::Clock;
use tracing::{debug, info, warn};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// True if `name` is an in-progress or temporary artifact.
pub fn is_temporary(name: &str) -> bool {
    TEMPORARY_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// True if `name` marks a download the browser is still writing.
pub fn is_in_progress(name: &str) -> bool {
    name.ends_with(IN_PROGRESS_SUFFIX)
}

/// Names of the finished (non-temporary) files currently in `dir`.
pub fn snapshot(listing: &dyn DirectoryListing, dir: &Path) -> std::io::Result<BTreeSet<String>> {
    Ok(listing
        .list(dir)?
        .into_iter()
        .filter(|e| !is_temporary(&e.name))
        .map(|e| e.name)
        .collect())
}

/// In-progress artifacts already sitting in `dir`, e.g. from an interrupted
/// earlier download. A listing error yields an empty set.
pub fn leftover_artifacts(listing: &dyn DirectoryListing, dir: &Path) -> BTreeSet<String> {
    match listing.list(dir) {
        Ok(entries) => entries
            .into_iter()
            .filter(|e| is_in_progress(&e.name))
            .map(|e| e.name)
            .collect(),
        Err(e) => {
            warn!("Could not list {} for leftover downloads: {}", dir.display(), e);
            BTreeSet::new()
        }
    }
}

/// Pick the download among files that are new relative to `files_before`.
///
/// Several candidates can appear when something else drops a file into the
/// directory. The most recently modified one wins; equal or unknown mtimes
/// fall back to the greatest name so the choice is deterministic.
pub fn pick_new_file(entries: &[DirEntry], files_before: &BTreeSet<String>) -> Option<String> {
    entries
        .iter()
        .filter(|e| !is_temporary(&e.name) && !files_before.contains(&e.name))
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
        .map(|e| e.name.clone())
}

/// One direct directory diff, ignoring temporary artifacts.
pub fn reconcile(
    listing: &dyn DirectoryListing,
    dir: &Path,
    files_before: &BTreeSet<String>,
) -> Option<String> {
    match listing.list(dir) {
        Ok(entries) => pick_new_file(&entries, files_before),
        Err(e) => {
            warn!("Could not list {} for reconciliation: {}", dir.display(), e);
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Pending,
    InProgress,
    Done,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResult {
    pub completed: bool,
    pub filename: Option<String>,
    /// Phase transitions in the order they were observed (no repeats).
    pub phases: Vec<WatchPhase>,
    pub elapsed: Duration,
}

impl WatchResult {
    pub fn observed(&self, phase: WatchPhase) -> bool {
        self.phases.contains(&phase)
    }
}

/// Ephemeral per-call state.
struct WatchState {
    download_started: bool,
    phases: Vec<WatchPhase>,
}

impl WatchState {
    fn enter(&mut self, phase: WatchPhase) {
        if self.phases.last() != Some(&phase) {
            self.phases.push(phase);
        }
    }
}

pub struct DownloadWatcher<'a> {
    listing: &'a dyn DirectoryListing,
    clock: &'a dyn Clock,
    leftovers: BTreeSet<String>,
}

impl<'a> DownloadWatcher<'a> {
    pub fn new(listing: &'a dyn DirectoryListing, clock: &'a dyn Clock) -> Self {
        Self {
            listing,
            clock,
            leftovers: BTreeSet::new(),
        }
    }

    /// In-progress artifacts that predate the download and must not hold it open.
    pub fn ignoring_leftovers(mut self, leftovers: BTreeSet<String>) -> Self {
        self.leftovers = leftovers;
        self
    }

    /// Block until a new finished file shows up in `dir` or `config.timeout` elapses.
    ///
    /// Never fails: "no file" is `completed == false`, and listing errors are
    /// treated as an empty poll.
    pub fn wait_for_completion(
        &self,
        dir: &Path,
        files_before: &BTreeSet<String>,
        config: &WatchConfig,
    ) -> WatchResult {
        info!("Waiting for download to start and complete...");
        let poll_interval = config.poll_interval.max(MIN_POLL_INTERVAL);
        let start = self.clock.now();
        let mut state = WatchState {
            download_started: false,
            phases: Vec::new(),
        };

        loop {
            let elapsed = self.clock.elapsed_since(start);
            if elapsed >= config.timeout {
                break;
            }

            match self.listing.list(dir) {
                Ok(entries) => {
                    let in_progress = entries
                        .iter()
                        .filter(|e| is_in_progress(&e.name) && !self.leftovers.contains(&e.name))
                        .count();
                    if in_progress > 0 {
                        if !state.download_started {
                            info!("Download started! ({}s)", elapsed.as_secs());
                            state.download_started = true;
                        }
                        state.enter(WatchPhase::InProgress);
                        debug!("Download in progress... ({}s elapsed)", elapsed.as_secs());
                    } else if let Some(name) = pick_new_file(&entries, files_before) {
                        info!("Download complete! ({}s total): {}", elapsed.as_secs(), name);
                        state.enter(WatchPhase::Done);
                        return WatchResult {
                            completed: true,
                            filename: Some(name),
                            phases: state.phases,
                            elapsed,
                        };
                    } else if !state.download_started {
                        state.enter(WatchPhase::Pending);
                        debug!("Waiting for download to start... ({}s elapsed)", elapsed.as_secs());
                    }
                }
                Err(e) => warn!("Could not list {}: {}", dir.display(), e),
            }

            let remaining = config.timeout.saturating_sub(elapsed);
            self.clock.sleep(poll_interval.min(remaining));
        }

        warn!("Download timeout reached after {}s", config.timeout.as_secs());
        state.enter(WatchPhase::TimedOut);

        // A file may have landed between the last poll and the deadline.
        let elapsed = self.clock.elapsed_since(start);
        match reconcile(self.listing, dir, files_before) {
            Some(name) => {
                info!("Found file after waiting: {}", name);
                state.enter(WatchPhase::Done);
                WatchResult {
                    completed: true,
                    filename: Some(name),
                    phases: state.phases,
                    elapsed,
                }
            }
            None => {
                debug!("Files before: {:?}", files_before);
                WatchResult {
                    completed: false,
                    filename: None,
                    phases: state.phases,
                    elapsed,
                }
            }
        }
    }
}
