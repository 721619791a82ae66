//! Session loop: one attempt per period, in order, with a pause in between.

use std::time::Duration;
use tarmac_ledger::ProvenanceLedger;
use tarmac_protocol::defaults::DEFAULT_INTER_ATTEMPT_PAUSE_SECS;
use tarmac_protocol::{CancellationToken, DownloadOutcome, Period};
use tracing::{info, warn};

use crate::attempt::DownloadAttempt;

/// Decides after a successful probe whether the rest of the session runs.
pub type ConfirmHook<'a> = Box<dyn FnMut(&DownloadOutcome) -> bool + 'a>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub inter_attempt_pause: Duration,
    /// Treat the first period as a probe; stop the session if it fails.
    pub probe_first: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            inter_attempt_pause: Duration::from_secs(DEFAULT_INTER_ATTEMPT_PAUSE_SECS),
            probe_first: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTally {
    pub succeeded: u64,
    pub failed: u64,
}

impl SessionTally {
    pub fn attempted(&self) -> u64 {
        self.succeeded + self.failed
    }

    fn count(&mut self, outcome: &DownloadOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

pub struct SessionController<'a> {
    attempt: DownloadAttempt<'a>,
    ledger: &'a mut ProvenanceLedger,
    options: SessionOptions,
    cancel: CancellationToken,
    confirm: Option<ConfirmHook<'a>>,
}

impl<'a> SessionController<'a> {
    pub fn new(
        attempt: DownloadAttempt<'a>,
        ledger: &'a mut ProvenanceLedger,
        options: SessionOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            attempt,
            ledger,
            options,
            cancel,
            confirm: None,
        }
    }

    pub fn with_confirmation(mut self, hook: ConfirmHook<'a>) -> Self {
        self.confirm = Some(hook);
        self
    }

    /// Attempt every period in order. No retries; cancellation stops the loop
    /// before the next period and the tally covers completed attempts only.
    pub fn run(&mut self, periods: &[Period], desired: &[String]) -> SessionTally {
        let mut tally = SessionTally::default();

        for (index, period) in periods.iter().copied().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Process interrupted, stopping before {}", period);
                break;
            }

            let outcome = self.attempt.run(self.ledger, period, desired);
            tally.count(&outcome);
            if outcome.is_success() {
                info!("Successfully processed {}-{}", period.year(), period.month_name());
            } else {
                warn!("Failed to process {}-{}", period.year(), period.month_name());
            }

            if index == 0 && self.options.probe_first && !self.continue_after_probe(&outcome) {
                break;
            }

            if index + 1 < periods.len() && !self.cancel.is_cancelled() {
                self.attempt.clock().sleep(self.options.inter_attempt_pause);
            }
        }

        info!(
            "Session finished: {} succeeded, {} failed",
            tally.succeeded, tally.failed
        );
        tally
    }

    fn continue_after_probe(&mut self, outcome: &DownloadOutcome) -> bool {
        if !outcome.is_success() {
            warn!("Probe download failed, check the download folder before retrying");
            return false;
        }
        info!("Probe download successful");
        match self.confirm.as_mut() {
            Some(confirm) => {
                let proceed = confirm(outcome);
                if !proceed {
                    info!("Stopping after probe download");
                }
                proceed
            }
            None => true,
        }
    }
}

/// Periods a fetch covers: the explicit list if one was given, else `from..=to`.
pub fn plan_periods(from: Period, to: Period, explicit: &[Period]) -> Vec<Period> {
    if explicit.is_empty() {
        Period::range(from, to)
    } else {
        explicit.to_vec()
    }
}
