//! Browser automation capability for Tarmac.
//!
//! The download engine never talks to a browser directly. It drives a
//! [`BrowserDriver`]: navigate, find controls, read their attributes, click.
//! [`WebDriverClient`] implements it over the W3C WebDriver HTTP protocol
//! (chromedriver); tests implement it with scripted fakes.

mod client;
pub mod wait;

pub use client::{ClientOptions, WebDriverClient};
pub use wait::{wait_for_element, Readiness};

use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("WebDriver error '{error}': {message}")]
    Protocol { error: String, message: String },

    #[error("No element matches {0}")]
    NoSuchElement(String),

    #[error("Timed out after {secs}s waiting for {what}", secs = .waited.as_secs())]
    Timeout { what: String, waited: Duration },

    #[error("Invalid WebDriver response: {0}")]
    InvalidResponse(String),
}

impl DriverError {
    /// Errors after which the browser session is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Http(_))
    }
}

/// How to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    /// W3C `(using, value)` pair. WebDriver has no id strategy, ids go through CSS.
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Id(id) => {
                let escaped = id.replace('\\', "\\\\").replace('"', "\\\"");
                ("css selector", format!("[id=\"{}\"]", escaped))
            }
            Locator::Css(selector) => ("css selector", selector.clone()),
            Locator::XPath(expr) => ("xpath", expr.clone()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{}", id),
            Locator::Css(selector) => write!(f, "css '{}'", selector),
            Locator::XPath(expr) => write!(f, "xpath '{}'", expr),
        }
    }
}

/// Opaque reference to an element in the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Quote `text` as an XPath string literal, whatever quotes it contains.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    let parts: Vec<String> = text.split('\'').map(|p| format!("'{}'", p)).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Operations the download engine needs from a browser.
pub trait BrowserDriver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    fn find_elements(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError>;

    fn find_child_elements(
        &mut self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError>;

    fn attribute(&mut self, element: &ElementHandle, name: &str)
        -> Result<Option<String>, DriverError>;

    fn text(&mut self, element: &ElementHandle) -> Result<String, DriverError>;

    fn is_selected(&mut self, element: &ElementHandle) -> Result<bool, DriverError>;

    fn is_displayed(&mut self, element: &ElementHandle) -> Result<bool, DriverError>;

    fn is_enabled(&mut self, element: &ElementHandle) -> Result<bool, DriverError>;

    fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle, DriverError> {
        self.find_elements(locator)?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NoSuchElement(locator.to_string()))
    }

    /// Pick the `<option>` of a `<select>` whose visible text equals `text`.
    fn select_by_text(&mut self, select: &ElementHandle, text: &str) -> Result<(), DriverError> {
        let option_xpath = format!(".//option[normalize-space(.)={}]", xpath_literal(text));
        let option = self
            .find_child_elements(select, &Locator::xpath(option_xpath))?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NoSuchElement(format!("option '{}'", text)))?;
        if !self.is_selected(&option)? {
            self.click(&option)?;
        }
        Ok(())
    }

    fn quit(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}
