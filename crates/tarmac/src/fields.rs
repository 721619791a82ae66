//! Field selection on the export form.
//!
//! Controls are matched against free-text tokens: a control is wanted when any
//! token is a case-insensitive substring of its label, value, name or id.
//! Matching is pure ([`plan_selection`]); [`select_fields`] reads the controls
//! off the page and clicks the planned ones.

use tarmac_protocol::SelectedField;
use tarmac_webdriver::{xpath_literal, BrowserDriver, DriverError, ElementHandle, Locator};
use tracing::{debug, info, warn};

/// One selectable control as read from the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub handle: ElementHandle,
    pub id: String,
    pub name: String,
    pub value: String,
    pub label: Option<String>,
    pub selected: bool,
}

impl Control {
    /// First non-empty of label, value, name, id.
    pub fn display_name(&self) -> &str {
        [
            self.label.as_deref().unwrap_or_default(),
            self.value.as_str(),
            self.name.as_str(),
            self.id.as_str(),
        ]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or_default()
    }

    pub fn matches(&self, desired: &[String]) -> bool {
        let haystacks = [
            self.label.as_deref().unwrap_or_default().to_lowercase(),
            self.value.to_lowercase(),
            self.name.to_lowercase(),
            self.id.to_lowercase(),
        ];
        desired
            .iter()
            .filter(|token| !token.is_empty())
            .map(|token| token.to_lowercase())
            .any(|token| haystacks.iter().any(|h| h.contains(&token)))
    }
}

/// Controls that match `desired` and are not already selected, in page order.
pub fn plan_selection<'a>(controls: &'a [Control], desired: &[String]) -> Vec<&'a Control> {
    controls
        .iter()
        .filter(|c| !c.selected && c.matches(desired))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    pub selected: Vec<SelectedField>,
    /// False only when the controls could not be enumerated at all.
    pub fully_succeeded: bool,
}

/// Toggle on every control under `locator` that matches `desired`.
///
/// Per-control failures are logged and skipped.
pub fn select_fields(
    driver: &mut dyn BrowserDriver,
    locator: &Locator,
    desired: &[String],
) -> FieldSelection {
    let handles = match driver.find_elements(locator) {
        Ok(handles) => handles,
        Err(e) => {
            warn!("Error selecting fields: {}", e);
            return FieldSelection::default();
        }
    };
    info!("Found {} selectable fields", handles.len());

    let mut controls = Vec::with_capacity(handles.len());
    for handle in handles {
        match read_control(driver, handle) {
            Ok(control) => controls.push(control),
            Err(e) => debug!("Skipping unreadable field control: {}", e),
        }
    }

    let mut selected = Vec::new();
    for control in plan_selection(&controls, desired) {
        match driver.click(&control.handle) {
            Ok(()) => {
                info!("  Selected: {}", control.display_name());
                selected.push(SelectedField::new(control.display_name()));
            }
            Err(e) => warn!("Could not toggle {}: {}", control.display_name(), e),
        }
    }
    info!("Selected {} fields", selected.len());

    FieldSelection {
        selected,
        fully_succeeded: true,
    }
}

fn read_control(
    driver: &mut dyn BrowserDriver,
    handle: ElementHandle,
) -> Result<Control, DriverError> {
    let id = driver.attribute(&handle, "id")?.unwrap_or_default();
    let name = driver.attribute(&handle, "name")?.unwrap_or_default();
    let value = driver.attribute(&handle, "value")?.unwrap_or_default();
    let selected = driver.is_selected(&handle)?;
    let label = label_text(driver, &handle, &id);
    Ok(Control {
        handle,
        id,
        name,
        value,
        label,
        selected,
    })
}

/// `<label for=id>` first, then an enclosing `<label>`.
fn label_text(driver: &mut dyn BrowserDriver, handle: &ElementHandle, id: &str) -> Option<String> {
    let mut candidates = Vec::new();
    if !id.is_empty() {
        let by_for = Locator::xpath(format!("//label[@for={}]", xpath_literal(id)));
        candidates.extend(driver.find_elements(&by_for).unwrap_or_default());
    }
    if candidates.is_empty() {
        let ancestor = Locator::xpath("./ancestor::label");
        candidates.extend(
            driver
                .find_child_elements(handle, &ancestor)
                .unwrap_or_default(),
        );
    }

    let label = candidates.first()?;
    let text = driver.text(label).ok()?;
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
