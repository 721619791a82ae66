//! Bounded readiness polling, the stand-in for fixed page-load sleeps.

use std::time::Duration;
use tarmac_protocol::Clock;
use tracing::debug;

use crate::{BrowserDriver, DriverError, ElementHandle, Locator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Attached to the DOM.
    Present,
    /// Attached, displayed and enabled.
    Clickable,
}

/// Poll until an element matching `locator` reaches `readiness`.
///
/// Non-fatal driver errors (stale references, element not yet rendered) are
/// retried; transport errors abort immediately. The locator is always checked
/// at least once, even with a zero timeout.
pub fn wait_for_element(
    driver: &mut dyn BrowserDriver,
    clock: &dyn Clock,
    locator: &Locator,
    readiness: Readiness,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<ElementHandle, DriverError> {
    let start = clock.now();
    loop {
        match probe(driver, locator, readiness) {
            Ok(Some(element)) => return Ok(element),
            Ok(None) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("{} not ready: {}", locator, e),
        }

        let elapsed = clock.elapsed_since(start);
        if elapsed >= timeout {
            return Err(DriverError::Timeout {
                what: locator.to_string(),
                waited: elapsed,
            });
        }
        clock.sleep(poll_interval.min(timeout - elapsed));
    }
}

fn probe(
    driver: &mut dyn BrowserDriver,
    locator: &Locator,
    readiness: Readiness,
) -> Result<Option<ElementHandle>, DriverError> {
    for element in driver.find_elements(locator)? {
        match readiness {
            Readiness::Present => return Ok(Some(element)),
            Readiness::Clickable => {
                if driver.is_displayed(&element)? && driver.is_enabled(&element)? {
                    return Ok(Some(element));
                }
            }
        }
    }
    Ok(None)
}
