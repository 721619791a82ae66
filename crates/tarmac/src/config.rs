//! Configuration for the Tarmac downloader
//!
//! Loaded from `~/.tarmac/config.toml` (or `--config`); every key is optional
//! and falls back to the values in `tarmac_protocol::defaults`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tarmac_protocol::defaults::*;
use tarmac_watch::WatchConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TarmacConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub form: FormConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub webdriver: WebDriverConfig,
}

/// Where the export form lives and how the provenance ledger names it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_url")]
    pub url: String,

    #[serde(default = "default_data_source")]
    pub data_source: String,

    #[serde(default = "default_dataset")]
    pub dataset: String,
}

fn default_source_url() -> String {
    DEFAULT_SOURCE_URL.to_string()
}

fn default_data_source() -> String {
    DEFAULT_DATA_SOURCE.to_string()
}

fn default_dataset() -> String {
    DEFAULT_DATASET.to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            data_source: default_data_source(),
            dataset: default_dataset(),
        }
    }
}

/// Element ids on the export form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormConfig {
    #[serde(default = "default_year_select_id")]
    pub year_select_id: String,

    #[serde(default = "default_month_select_id")]
    pub month_select_id: String,

    #[serde(default = "default_trigger_id")]
    pub trigger_id: String,

    /// CSS selector enumerating the selectable field controls
    #[serde(default = "default_field_control_css")]
    pub field_control_css: String,

    /// Field tokens used when `--field` is not given
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
}

fn default_year_select_id() -> String {
    DEFAULT_YEAR_SELECT_ID.to_string()
}

fn default_month_select_id() -> String {
    DEFAULT_MONTH_SELECT_ID.to_string()
}

fn default_trigger_id() -> String {
    DEFAULT_TRIGGER_ID.to_string()
}

fn default_field_control_css() -> String {
    DEFAULT_FIELD_CONTROL_CSS.to_string()
}

fn default_fields() -> Vec<String> {
    vec![DEFAULT_FIELD.to_string()]
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            year_select_id: default_year_select_id(),
            month_select_id: default_month_select_id(),
            trigger_id: default_trigger_id(),
            field_control_css: default_field_control_css(),
            fields: default_fields(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_element_wait")]
    pub element_wait_secs: u64,

    /// Pause after each dropdown selection while the form re-renders
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,

    #[serde(default = "default_inter_attempt_pause")]
    pub inter_attempt_pause_secs: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_download_timeout() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_element_wait() -> u64 {
    DEFAULT_ELEMENT_WAIT_SECS
}

fn default_settle_millis() -> u64 {
    DEFAULT_SETTLE_MILLIS
}

fn default_inter_attempt_pause() -> u64 {
    DEFAULT_INTER_ATTEMPT_PAUSE_SECS
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            download_timeout_secs: default_download_timeout(),
            element_wait_secs: default_element_wait(),
            settle_millis: default_settle_millis(),
            inter_attempt_pause_secs: default_inter_attempt_pause(),
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_secs(self.element_wait_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_millis)
    }

    pub fn inter_attempt_pause(&self) -> Duration {
        Duration::from_secs(self.inter_attempt_pause_secs)
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            timeout: Duration::from_secs(self.download_timeout_secs),
            poll_interval: self.poll_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Relative paths resolve against the working directory
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Defaults to `<download_dir>/provenance`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_dir: Option<PathBuf>,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(DOWNLOAD_DIR_NAME)
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            ledger_dir: None,
        }
    }
}

/// Download and ledger directories after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub download_dir: PathBuf,
    pub ledger_dir: PathBuf,
}

impl PathsConfig {
    /// Resolve both directories. The ledger may not share the download
    /// directory: its staging file and summary would look like downloads.
    pub fn resolve(&self) -> Result<ResolvedPaths, ConfigError> {
        let download_dir = self.resolved_download_dir()?;
        let ledger_dir = self.resolved_ledger_dir(&download_dir);
        if ledger_dir == download_dir {
            return Err(ConfigError::Invalid(format!(
                "paths.ledger_dir must not be the download directory ({})",
                download_dir.display()
            )));
        }
        Ok(ResolvedPaths {
            download_dir,
            ledger_dir,
        })
    }

    /// Absolute download directory; the browser rejects relative paths.
    pub fn resolved_download_dir(&self) -> Result<PathBuf, ConfigError> {
        if self.download_dir.is_absolute() {
            return Ok(self.download_dir.clone());
        }
        let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        Ok(cwd.join(&self.download_dir))
    }

    pub fn resolved_ledger_dir(&self, download_dir: &Path) -> PathBuf {
        match &self.ledger_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => download_dir.join(dir),
            None => download_dir.join(LEDGER_DIR_NAME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebDriverConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub headless: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_WEBDRIVER_URL.to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            headless: false,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl TarmacConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TarmacConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given (it must exist), else `default_path` if it
    /// exists, else built-in defaults.
    pub fn load_or_default(
        explicit: Option<&Path>,
        default_path: &Path,
    ) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None if default_path.exists() => Self::load(default_path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.url.trim().is_empty() {
            return Err(ConfigError::Invalid("source.url is empty".into()));
        }
        if self.timing.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "timing.poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.timing.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timing.download_timeout_secs must be at least 1".into(),
            ));
        }
        if self.paths.ledger_dir.is_some() {
            self.paths.resolve()?;
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
