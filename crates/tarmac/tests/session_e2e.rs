//! End-to-end session tests against a scripted export form.
//!
//! The fake driver plays the BTS form: two dropdowns, a couple of checkboxes
//! and a download button that drops a file into the download directory when
//! clicked. All waiting runs on a `ManualClock`.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tarmac::{
    AttemptSettings, DownloadAttempt, SessionController, SessionOptions, SessionTally,
};
use tarmac_ledger::{LedgerGuard, ProvenanceLedger, SessionMetadata};
use tarmac_protocol::{
    CancellationToken, DownloadOutcome, DownloadStatus, ManualClock, Period, SelectedField,
};
use tarmac_watch::{DirEntry, DirectoryListing, FsListing};
use tarmac_webdriver::{BrowserDriver, DriverError, ElementHandle, Locator};
use tempfile::{tempdir, TempDir};

struct ExportForm {
    download_dir: PathBuf,
    year: Option<String>,
    month: Option<String>,
    trigger_clickable: bool,
    checkboxes_fail: bool,
    /// Periods (YYYY-MM) for which the server never sends a file
    no_file_for: HashSet<String>,
    /// Token cancelled when the download button is clicked
    cancel_on_click: Option<CancellationToken>,
    /// Leave a `.crdownload` behind instead of the finished file
    partial_downloads: bool,
    navigations: usize,
    downloads_triggered: usize,
}

impl ExportForm {
    fn new(download_dir: &Path) -> Self {
        Self {
            download_dir: download_dir.to_path_buf(),
            year: None,
            month: None,
            trigger_clickable: true,
            checkboxes_fail: false,
            no_file_for: HashSet::new(),
            cancel_on_click: None,
            partial_downloads: false,
            navigations: 0,
            downloads_triggered: 0,
        }
    }

    fn current_period(&self) -> Option<Period> {
        let year: i32 = self.year.as_deref()?.parse().ok()?;
        let month = tarmac_protocol::MONTH_NAMES
            .iter()
            .position(|m| Some(*m) == self.month.as_deref())?;
        Period::new(year, month as u32 + 1).ok()
    }
}

impl BrowserDriver for ExportForm {
    fn navigate(&mut self, _url: &str) -> Result<(), DriverError> {
        self.navigations += 1;
        self.year = None;
        self.month = None;
        Ok(())
    }

    fn find_elements(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError> {
        let ids: Vec<&str> = match locator {
            Locator::Id(id) if id == "cboYear" => vec!["year"],
            Locator::Id(id) if id == "cboPeriod" => vec!["month"],
            Locator::Id(id) if id == "btnDownload" => vec!["trigger"],
            Locator::Css(_) if self.checkboxes_fail => {
                return Err(DriverError::Protocol {
                    error: "javascript error".into(),
                    message: "form not rendered".into(),
                })
            }
            Locator::Css(_) => vec!["chk-zip", "chk-carrier"],
            _ => vec![],
        };
        Ok(ids.into_iter().map(ElementHandle::new).collect())
    }

    fn find_child_elements(
        &mut self,
        _parent: &ElementHandle,
        _locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        Ok(vec![])
    }

    fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let value = match (element.id(), name) {
            ("chk-zip", "id") => "chkDownloadZip",
            ("chk-carrier", "id") => "CARRIER",
            ("chk-carrier", "value") => "CARRIER",
            _ => return Ok(None),
        };
        Ok(Some(value.to_string()))
    }

    fn text(&mut self, _element: &ElementHandle) -> Result<String, DriverError> {
        Ok(String::new())
    }

    fn is_selected(&mut self, _element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(false)
    }

    fn is_displayed(&mut self, _element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(true)
    }

    fn is_enabled(&mut self, element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(element.id() != "trigger" || self.trigger_clickable)
    }

    fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        if element.id() != "trigger" {
            return Ok(());
        }
        self.downloads_triggered += 1;
        if let Some(token) = &self.cancel_on_click {
            token.cancel();
        }
        let period = self
            .current_period()
            .ok_or_else(|| DriverError::InvalidResponse("form incomplete".into()))?;
        if !self.no_file_for.contains(&period.to_string()) {
            let mut name = format!("On_Time_{}_{}.zip", period.year(), period.month());
            if self.partial_downloads {
                name.push_str(".crdownload");
            }
            fs::write(self.download_dir.join(name), b"PK\x03\x04export").map_err(|e| {
                DriverError::InvalidResponse(e.to_string())
            })?;
        }
        Ok(())
    }

    fn select_by_text(&mut self, select: &ElementHandle, text: &str) -> Result<(), DriverError> {
        match select.id() {
            "year" => self.year = Some(text.to_string()),
            "month" => self.month = Some(text.to_string()),
            other => return Err(DriverError::NoSuchElement(other.to_string())),
        }
        Ok(())
    }
}

/// Real directory listing where the browser finishes a `.crdownload` after
/// it has been seen by `polls_until_done` listings.
struct FinishingListing {
    polls_until_done: usize,
    seen: Cell<usize>,
}

impl DirectoryListing for FinishingListing {
    fn list(&self, dir: &Path) -> io::Result<Vec<DirEntry>> {
        let entries = FsListing.list(dir)?;
        let partial: Vec<&DirEntry> = entries
            .iter()
            .filter(|e| e.name.ends_with(".crdownload"))
            .collect();
        if partial.is_empty() {
            return Ok(entries);
        }
        self.seen.set(self.seen.get() + 1);
        if self.seen.get() <= self.polls_until_done {
            return Ok(entries);
        }
        for entry in partial {
            let finished = entry.name.trim_end_matches(".crdownload");
            fs::rename(dir.join(&entry.name), dir.join(finished))?;
        }
        FsListing.list(dir)
    }
}

struct Harness {
    dir: TempDir,
    clock: ManualClock,
    settings: AttemptSettings,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempdir().unwrap(),
            clock: ManualClock::new(),
            settings: AttemptSettings::default(),
        }
    }

    fn download_dir(&self) -> &Path {
        self.dir.path()
    }

    fn ledger(&self) -> ProvenanceLedger {
        ProvenanceLedger::create(&self.dir.path().join("provenance"), SessionMetadata::default())
            .unwrap()
    }

    fn run(
        &self,
        form: &mut ExportForm,
        ledger: &mut ProvenanceLedger,
        periods: &[Period],
        options: SessionOptions,
        cancel: CancellationToken,
        confirm: Option<Box<dyn FnMut(&DownloadOutcome) -> bool>>,
    ) -> SessionTally {
        self.run_with_listing(form, ledger, periods, options, cancel, confirm, &FsListing)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_with_listing(
        &self,
        form: &mut ExportForm,
        ledger: &mut ProvenanceLedger,
        periods: &[Period],
        options: SessionOptions,
        cancel: CancellationToken,
        confirm: Option<Box<dyn FnMut(&DownloadOutcome) -> bool>>,
        listing: &dyn DirectoryListing,
    ) -> SessionTally {
        let attempt = DownloadAttempt::new(
            form,
            &self.clock,
            listing,
            &self.settings,
            self.download_dir(),
        );
        let mut session = SessionController::new(attempt, ledger, options, cancel);
        if let Some(hook) = confirm {
            session = session.with_confirmation(hook);
        }
        session.run(periods, &["chkDownloadZip".to_string()])
    }
}

fn p(s: &str) -> Period {
    s.parse().unwrap()
}

fn quick_options() -> SessionOptions {
    SessionOptions {
        inter_attempt_pause: Duration::from_secs(5),
        probe_first: false,
    }
}

#[test]
fn test_single_period_success() {
    let harness = Harness::new();
    let mut form = ExportForm::new(harness.download_dir());
    let mut ledger = harness.ledger();

    let tally = harness.run(
        &mut form,
        &mut ledger,
        &[p("2023-01")],
        quick_options(),
        CancellationToken::new(),
        None,
    );

    assert_eq!(tally, SessionTally { succeeded: 1, failed: 0 });
    assert_eq!(ledger.len(), 1);
    let entry = &ledger.document().downloads[0];
    assert_eq!(entry.status, DownloadStatus::Success);
    assert_eq!(entry.year, 2023);
    assert_eq!(entry.month_name, "January");
    assert_eq!(entry.fields_selected, vec!["chkDownloadZip"]);
    assert_eq!(entry.download_filename.as_deref(), Some("On_Time_2023_1.zip"));
    assert_eq!(entry.file_size_bytes, Some(10));
    assert_eq!(entry.error_message, None);
}

#[test]
fn test_attempt_outcome_carries_selected_fields() {
    let harness = Harness::new();
    let mut form = ExportForm::new(harness.download_dir());
    let mut ledger = harness.ledger();
    let listing = FsListing;

    let mut attempt = DownloadAttempt::new(
        &mut form,
        &harness.clock,
        &listing,
        &harness.settings,
        harness.download_dir(),
    );
    let outcome = attempt.run(
        &mut ledger,
        p("2024-02"),
        &["downloadzip".to_string(), "carrier".to_string()],
    );

    assert!(outcome.is_success());
    assert_eq!(
        outcome.fields_selected(),
        &[SelectedField::new("chkDownloadZip"), SelectedField::new("CARRIER")]
    );
    assert_eq!(outcome.filename(), Some("On_Time_2024_2.zip"));
    // Two dropdown settle delays.
    assert_eq!(harness.clock.elapsed(), Duration::from_secs(4));
}

#[test]
fn test_unclickable_trigger_fails_attempt() {
    let harness = Harness::new();
    let mut form = ExportForm::new(harness.download_dir());
    form.trigger_clickable = false;
    let mut ledger = harness.ledger();

    let tally = harness.run(
        &mut form,
        &mut ledger,
        &[p("2023-01")],
        quick_options(),
        CancellationToken::new(),
        None,
    );

    assert_eq!(tally, SessionTally { succeeded: 0, failed: 1 });
    assert_eq!(form.downloads_triggered, 0);
    assert_eq!(ledger.len(), 1);
    let entry = &ledger.document().downloads[0];
    assert_eq!(entry.status, DownloadStatus::Failed);
    assert_eq!(entry.download_filename, None);
    assert!(!entry.error_message.as_deref().unwrap_or_default().is_empty());
}

#[test]
fn test_missing_file_times_out_as_failure() {
    let harness = Harness::new();
    let mut form = ExportForm::new(harness.download_dir());
    form.no_file_for.insert("2023-02".into());
    let mut ledger = harness.ledger();

    let tally = harness.run(
        &mut form,
        &mut ledger,
        &[p("2023-01"), p("2023-02"), p("2023-03")],
        quick_options(),
        CancellationToken::new(),
        None,
    );

    assert_eq!(tally, SessionTally { succeeded: 2, failed: 1 });
    let statuses: Vec<(u32, DownloadStatus)> = ledger
        .document()
        .downloads
        .iter()
        .map(|d| (d.month, d.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (1, DownloadStatus::Success),
            (2, DownloadStatus::Failed),
            (3, DownloadStatus::Success),
        ]
    );
    assert_eq!(
        ledger.document().downloads[1].error_message.as_deref(),
        Some("No file downloaded - check download folder manually")
    );
    assert_eq!(tally.attempted() as usize, ledger.len());
}

#[test]
fn test_pause_between_periods_but_not_after_last() {
    let harness = Harness::new();
    let mut form = ExportForm::new(harness.download_dir());
    let mut ledger = harness.ledger();

    harness.run(
        &mut form,
        &mut ledger,
        &[p("2023-01"), p("2023-02"), p("2023-03")],
        quick_options(),
        CancellationToken::new(),
        None,
    );

    // 3 attempts x 2 settle delays (4s) + 2 pauses (10s).
    assert_eq!(harness.clock.elapsed(), Duration::from_secs(22));
}

#[test]
fn test_field_selection_failure_is_a_warning() {
    let harness = Harness::new();
    let mut form = ExportForm::new(harness.download_dir());
    form.checkboxes_fail = true;
    let mut ledger = harness.ledger();

    let tally = harness.run(
        &mut form,
        &mut ledger,
        &[p("2023-01")],
        quick_options(),
        CancellationToken::new(),
        None,
    );

    assert_eq!(tally.succeeded, 1);
    let entry = &ledger.document().downloads[0];
    assert_eq!(entry.status, DownloadStatus::Success);
    assert!(entry.fields_selected.is_empty());
    assert_eq!(entry.error_message.as_deref(), Some("Could not select fields"));
}

#[test]
fn test_failed_probe_stops_session() {
    let harness = Harness::new();
    let mut form = ExportForm::new(harness.download_dir());
    form.no_file_for.insert("2023-01".into());
    let mut ledger = harness.ledger();

    let tally = harness.run(
        &mut form,
        &mut ledger,
        &[p("2023-01"), p("2023-02"), p("2023-03")],
        SessionOptions {
            probe_first: true,
            ..quick_options()
        },
        CancellationToken::new(),
        None,
    );

    assert_eq!(tally, SessionTally { succeeded: 0, failed: 1 });
    assert_eq!(form.downloads_triggered, 1);
    assert_eq!(ledger.len(), 1);
}

#[test]
fn test_probe_confirmation_decides_continuation() {
    for (answer, expected_attempts) in [(false, 1usize), (true, 3usize)] {
        let harness = Harness::new();
        let mut form = ExportForm::new(harness.download_dir());
        let mut ledger = harness.ledger();
        let asked = Rc::new(RefCell::new(0));
        let asked_hook = asked.clone();

        let tally = harness.run(
            &mut form,
            &mut ledger,
            &[p("2023-01"), p("2023-02"), p("2023-03")],
            SessionOptions {
                probe_first: true,
                ..quick_options()
            },
            CancellationToken::new(),
            Some(Box::new(move |outcome: &DownloadOutcome| {
                assert!(outcome.is_success());
                *asked_hook.borrow_mut() += 1;
                answer
            })),
        );

        assert_eq!(*asked.borrow(), 1);
        assert_eq!(tally.attempted() as usize, expected_attempts);
        assert_eq!(ledger.len(), expected_attempts);
    }
}

#[test]
fn test_cancellation_stops_before_next_period_and_ledger_is_sealed() {
    let harness = Harness::new();
    let mut form = ExportForm::new(harness.download_dir());
    let cancel = CancellationToken::new();
    form.cancel_on_click = Some(cancel.clone());

    let ledger_path = {
        let mut guard = LedgerGuard::new(harness.ledger());
        let tally = harness.run(
            &mut form,
            &mut guard,
            &[p("2023-01"), p("2023-02"), p("2023-03")],
            quick_options(),
            cancel,
            None,
        );
        assert_eq!(tally.attempted(), 1);
        guard.path().to_path_buf()
        // Dropped unsealed: the guard seals with derived counts.
    };

    assert_eq!(form.downloads_triggered, 1);
    let document = ProvenanceLedger::load(&ledger_path).unwrap();
    assert_eq!(document.downloads.len(), 1);
    assert!(document.session_info.end_time.is_some());
    assert_eq!(document.session_info.total_downloads_attempted, Some(1));
    assert_eq!(
        document.session_info.successful_downloads.unwrap()
            + document.session_info.failed_downloads.unwrap(),
        1
    );
}

#[test]
fn test_interrupt_during_download_lets_attempt_finish() {
    let harness = Harness::new();
    let mut form = ExportForm::new(harness.download_dir());
    form.partial_downloads = true;
    let cancel = CancellationToken::new();
    form.cancel_on_click = Some(cancel.clone());
    let mut ledger = harness.ledger();
    let listing = FinishingListing {
        polls_until_done: 2,
        seen: Cell::new(0),
    };

    let tally = harness.run_with_listing(
        &mut form,
        &mut ledger,
        &[p("2023-01"), p("2023-02")],
        quick_options(),
        cancel,
        None,
        &listing,
    );

    assert_eq!(tally, SessionTally { succeeded: 1, failed: 0 });
    assert_eq!(form.downloads_triggered, 1);
    let entry = &ledger.document().downloads[0];
    assert_eq!(entry.status, DownloadStatus::Success);
    assert_eq!(entry.download_filename.as_deref(), Some("On_Time_2023_1.zip"));
    assert_eq!(entry.file_size_bytes, Some(10));
    // Two settle delays plus two polls while the file was still partial.
    assert_eq!(harness.clock.elapsed(), Duration::from_secs(8));
}

#[test]
fn test_preexisting_files_are_not_claimed() {
    let harness = Harness::new();
    fs::write(harness.download_dir().join("On_Time_2023_1.zip"), b"old").unwrap();
    let mut form = ExportForm::new(harness.download_dir());
    let mut ledger = harness.ledger();

    // The form overwrites the same name, so nothing new appears.
    let tally = harness.run(
        &mut form,
        &mut ledger,
        &[p("2023-01")],
        quick_options(),
        CancellationToken::new(),
        None,
    );

    assert_eq!(tally, SessionTally { succeeded: 0, failed: 1 });
}
