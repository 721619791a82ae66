//! Blocking W3C WebDriver client.
//!
//! One HTTP request per command, JSON in and out. The session is created with
//! Chrome download preferences pointing at the download directory, and deleted
//! when the client is dropped.

use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{BrowserDriver, DriverError, ElementHandle, Locator};

/// Key under which W3C drivers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub download_dir: PathBuf,
    pub headless: bool,
    pub request_timeout: Duration,
}

pub struct WebDriverClient {
    agent: ureq::Agent,
    endpoint: String,
    session_id: String,
    closed: bool,
}

impl WebDriverClient {
    /// Start a new browser session on the WebDriver server at `endpoint`.
    pub fn connect(endpoint: &str, options: &ClientOptions) -> Result<Self, DriverError> {
        let agent = ureq::AgentBuilder::new()
            .timeout(options.request_timeout)
            .build();
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let value = send(
            &agent,
            "POST",
            &format!("{}/session", endpoint),
            Some(session_capabilities(options)),
        )?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::InvalidResponse(format!("no sessionId in {}", value)))?
            .to_string();
        info!("WebDriver session {} started at {}", session_id, endpoint);

        let client = Self {
            agent,
            endpoint,
            session_id,
            closed: false,
        };
        client.allow_downloads(options);
        Ok(client)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    // Headless Chrome ignores the download prefs unless told through CDP.
    fn allow_downloads(&self, options: &ClientOptions) {
        let body = json!({
            "cmd": "Page.setDownloadBehavior",
            "params": {
                "behavior": "allow",
                "downloadPath": options.download_dir.to_string_lossy(),
            },
        });
        if let Err(e) = self.command("POST", "/goog/cdp/execute", Some(body)) {
            warn!("Could not set download behavior through CDP: {}", e);
        }
    }

    fn command(&self, method: &str, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        let url = format!("{}/session/{}{}", self.endpoint, self.session_id, path);
        send(&self.agent, method, &url, body)
    }

    fn element_command(
        &self,
        method: &str,
        element: &ElementHandle,
        suffix: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        self.command(method, &format!("/element/{}{}", element.id(), suffix), body)
    }

    fn bool_query(&self, element: &ElementHandle, suffix: &str) -> Result<bool, DriverError> {
        let value = self.element_command("GET", element, suffix, None)?;
        value
            .as_bool()
            .ok_or_else(|| DriverError::InvalidResponse(format!("expected bool, got {}", value)))
    }
}

fn session_capabilities(options: &ClientOptions) -> Value {
    let mut args = vec![
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--window-size=1920,1080",
        "--disable-popup-blocking",
        "--disable-notifications",
    ];
    if options.headless {
        args.push("--headless=new");
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": {
                    "args": args,
                    "excludeSwitches": ["enable-automation"],
                    "prefs": {
                        "download.default_directory": options.download_dir.to_string_lossy(),
                        "download.prompt_for_download": false,
                        "download.directory_upgrade": true,
                        "safebrowsing.enabled": false,
                        "profile.default_content_setting_values.automatic_downloads": 1,
                    },
                },
            },
        },
    })
}

fn send(
    agent: &ureq::Agent,
    method: &str,
    url: &str,
    body: Option<Value>,
) -> Result<Value, DriverError> {
    debug!("WebDriver {} {}", method, url);
    let request = agent.request(method, url);
    let result = match body {
        Some(body) => request.send_json(body),
        None => request.call(),
    };

    match result {
        Ok(response) => {
            let mut payload: Value = response
                .into_json()
                .map_err(|e| DriverError::InvalidResponse(e.to_string()))?;
            Ok(payload.get_mut("value").map(Value::take).unwrap_or(Value::Null))
        }
        Err(ureq::Error::Status(code, response)) => {
            let payload: Value = response.into_json().unwrap_or(Value::Null);
            Err(protocol_error(code, &payload["value"]))
        }
        Err(ureq::Error::Transport(transport)) => Err(DriverError::Http(transport.to_string())),
    }
}

fn protocol_error(code: u16, value: &Value) -> DriverError {
    let error = value["error"].as_str().unwrap_or("unknown error").to_string();
    let message = value["message"]
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| format!("HTTP {}", code));
    if error == "no such element" {
        DriverError::NoSuchElement(message)
    } else {
        DriverError::Protocol { error, message }
    }
}

fn element_handles(value: Value) -> Result<Vec<ElementHandle>, DriverError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(DriverError::InvalidResponse(format!(
                "expected element list, got {}",
                other
            )))
        }
    };
    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(ElementHandle::new)
                .ok_or_else(|| DriverError::InvalidResponse(format!("not an element: {}", item)))
        })
        .collect()
}

fn locator_body(locator: &Locator) -> Value {
    let (using, value) = locator.strategy();
    json!({ "using": using, "value": value })
}

impl BrowserDriver for WebDriverClient {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.command("POST", "/url", Some(json!({ "url": url })))?;
        Ok(())
    }

    fn find_elements(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError> {
        element_handles(self.command("POST", "/elements", Some(locator_body(locator)))?)
    }

    fn find_child_elements(
        &mut self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        element_handles(self.element_command(
            "POST",
            parent,
            "/elements",
            Some(locator_body(locator)),
        )?)
    }

    fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let value = self.element_command("GET", element, &format!("/attribute/{}", name), None)?;
        Ok(value.as_str().map(String::from))
    }

    fn text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        let value = self.element_command("GET", element, "/text", None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn is_selected(&mut self, element: &ElementHandle) -> Result<bool, DriverError> {
        self.bool_query(element, "/selected")
    }

    fn is_displayed(&mut self, element: &ElementHandle) -> Result<bool, DriverError> {
        self.bool_query(element, "/displayed")
    }

    fn is_enabled(&mut self, element: &ElementHandle) -> Result<bool, DriverError> {
        self.bool_query(element, "/enabled")
    }

    fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.element_command("POST", element, "/click", Some(json!({})))?;
        Ok(())
    }

    fn quit(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command("DELETE", "", None)?;
        info!("WebDriver session {} closed", self.session_id);
        Ok(())
    }
}

impl Drop for WebDriverClient {
    fn drop(&mut self) {
        if let Err(e) = self.quit() {
            warn!("Failed to close WebDriver session {}: {}", self.session_id, e);
        }
    }
}
