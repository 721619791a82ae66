//! One download attempt: form → trigger → watch → outcome → ledger.
//!
//! An attempt never fails by signature. Every error along the way turns into a
//! failed [`DownloadOutcome`] carrying the error text, and every outcome is
//! appended to the ledger before it is returned.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tarmac_ledger::ProvenanceLedger;
use tarmac_protocol::defaults::{FIELD_SELECTION_WARNING, NO_FILE_MESSAGE};
use tarmac_protocol::{Clock, DownloadOutcome, Period, SelectedField};
use tarmac_watch::{
    leftover_artifacts, reconcile, snapshot, DirectoryListing, DownloadWatcher, WatchConfig,
};
use tarmac_webdriver::{wait_for_element, BrowserDriver, DriverError, ElementHandle, Locator, Readiness};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TarmacConfig;
use crate::fields::select_fields;

/// How often readiness waits re-probe the page.
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("Could not list download directory {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: DriverError,
    },

    #[error("Could not select {what} '{value}': {source}")]
    Selection {
        what: &'static str,
        value: String,
        #[source]
        source: DriverError,
    },

    #[error("Download button unavailable: {0}")]
    Trigger(#[source] DriverError),

    #[error("{}", NO_FILE_MESSAGE)]
    NoFile,
}

/// Form layout and timing for every attempt of a session.
#[derive(Debug, Clone)]
pub struct AttemptSettings {
    pub source_url: String,
    pub year_select_id: String,
    pub month_select_id: String,
    pub trigger_id: String,
    pub field_controls: Locator,
    pub element_wait: Duration,
    pub settle: Duration,
    pub watch: WatchConfig,
}

impl AttemptSettings {
    pub fn from_config(config: &TarmacConfig) -> Self {
        Self {
            source_url: config.source.url.clone(),
            year_select_id: config.form.year_select_id.clone(),
            month_select_id: config.form.month_select_id.clone(),
            trigger_id: config.form.trigger_id.clone(),
            field_controls: Locator::css(config.form.field_control_css.clone()),
            element_wait: config.timing.element_wait(),
            settle: config.timing.settle(),
            watch: config.timing.watch_config(),
        }
    }
}

impl Default for AttemptSettings {
    fn default() -> Self {
        Self::from_config(&TarmacConfig::default())
    }
}

pub struct DownloadAttempt<'a> {
    driver: &'a mut dyn BrowserDriver,
    clock: &'a dyn Clock,
    listing: &'a dyn DirectoryListing,
    settings: &'a AttemptSettings,
    download_dir: &'a Path,
}

impl<'a> DownloadAttempt<'a> {
    pub fn new(
        driver: &'a mut dyn BrowserDriver,
        clock: &'a dyn Clock,
        listing: &'a dyn DirectoryListing,
        settings: &'a AttemptSettings,
        download_dir: &'a Path,
    ) -> Self {
        Self {
            driver,
            clock,
            listing,
            settings,
            download_dir,
        }
    }

    pub fn clock(&self) -> &'a dyn Clock {
        self.clock
    }

    /// Download `period` with `desired` fields and record the outcome in `ledger`.
    pub fn run(
        &mut self,
        ledger: &mut ProvenanceLedger,
        period: Period,
        desired: &[String],
    ) -> DownloadOutcome {
        info!("Processing: {} {}", period.month_name(), period.year());

        let mut fields = Vec::new();
        let outcome = match self.execute(period, desired, &mut fields) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Error downloading data for {}: {}", period, e);
                DownloadOutcome::failed(period, fields, e.to_string())
            }
        };

        if let Err(e) = ledger.record(&outcome) {
            warn!("Failed to record {} in provenance ledger: {}", period, e);
        }
        outcome
    }

    fn execute(
        &mut self,
        period: Period,
        desired: &[String],
        fields: &mut Vec<SelectedField>,
    ) -> Result<DownloadOutcome, AttemptError> {
        let settings = self.settings;
        let dir = self.download_dir;

        let files_before = snapshot(self.listing, dir).map_err(|source| AttemptError::Snapshot {
            path: dir.to_path_buf(),
            source,
        })?;
        debug!("Files before download: {}", files_before.len());
        let leftovers = leftover_artifacts(self.listing, dir);
        if !leftovers.is_empty() {
            debug!("Ignoring leftover partial downloads: {:?}", leftovers);
        }

        info!("Loading page...");
        self.driver
            .navigate(&settings.source_url)
            .map_err(|source| AttemptError::Navigation {
                url: settings.source_url.clone(),
                source,
            })?;

        self.choose(&settings.year_select_id, &period.year().to_string(), "year")?;
        self.choose(&settings.month_select_id, period.month_name(), "month")?;

        info!("Selecting specific fields...");
        let selection = select_fields(&mut *self.driver, &settings.field_controls, desired);
        fields.extend(selection.selected);
        let warning = if selection.fully_succeeded {
            None
        } else {
            warn!("Warning: {}", FIELD_SELECTION_WARNING);
            Some(FIELD_SELECTION_WARNING.to_string())
        };

        info!("Looking for download button...");
        let trigger = self
            .wait_for(&Locator::id(settings.trigger_id.as_str()), Readiness::Clickable)
            .map_err(AttemptError::Trigger)?;
        self.driver.click(&trigger).map_err(AttemptError::Trigger)?;
        info!("Clicked download button for {}-{}", period.year(), period.month_name());

        let result = DownloadWatcher::new(self.listing, self.clock)
            .ignoring_leftovers(leftovers)
            .wait_for_completion(dir, &files_before, &settings.watch);

        let filename = match result.filename {
            Some(name) => name,
            None => {
                warn!("Warning: {}", NO_FILE_MESSAGE);
                match reconcile(self.listing, dir, &files_before) {
                    Some(name) => {
                        info!("  Actually found file: {}", name);
                        name
                    }
                    None => return Err(AttemptError::NoFile),
                }
            }
        };

        let size_bytes = match fs::metadata(dir.join(&filename)) {
            Ok(metadata) => Some(metadata.len()),
            Err(e) => {
                warn!("Could not read size of {}: {}", filename, e);
                None
            }
        };
        match size_bytes {
            Some(size) => info!("Downloaded: {} ({} bytes)", filename, size),
            None => info!("Downloaded: {}", filename),
        }

        Ok(DownloadOutcome::succeeded(
            period,
            fields.clone(),
            filename,
            size_bytes,
            warning,
        ))
    }

    fn choose(&mut self, select_id: &str, text: &str, what: &'static str) -> Result<(), AttemptError> {
        info!("Selecting {}: {}", what, text);
        let selection_error = |source| AttemptError::Selection {
            what,
            value: text.to_string(),
            source,
        };
        let select = self
            .wait_for(&Locator::id(select_id), Readiness::Present)
            .map_err(selection_error)?;
        self.driver
            .select_by_text(&select, text)
            .map_err(selection_error)?;
        self.clock.sleep(self.settings.settle);
        Ok(())
    }

    fn wait_for(&mut self, locator: &Locator, readiness: Readiness) -> Result<ElementHandle, DriverError> {
        wait_for_element(
            &mut *self.driver,
            self.clock,
            locator,
            readiness,
            self.settings.element_wait,
            ELEMENT_POLL_INTERVAL,
        )
    }
}
