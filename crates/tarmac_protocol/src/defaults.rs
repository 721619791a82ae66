//! Canonical default values shared by the engine, the CLI and the config file.

pub const DEFAULT_SOURCE_URL: &str =
    "https://www.transtats.bts.gov/DL_SelectFields.aspx?gnoyr_VQ=FGJ&QO_fu146_anzr=b0-gvzr";
pub const DEFAULT_DATA_SOURCE: &str = "Bureau of Transportation Statistics (BTS)";
pub const DEFAULT_DATASET: &str = "On-Time Performance";

pub const DEFAULT_YEAR_SELECT_ID: &str = "cboYear";
pub const DEFAULT_MONTH_SELECT_ID: &str = "cboPeriod";
pub const DEFAULT_TRIGGER_ID: &str = "btnDownload";
pub const DEFAULT_FIELD_CONTROL_CSS: &str = "input[type='checkbox']";

/// Field token selected when the caller names none (ZIP packaging toggle).
pub const DEFAULT_FIELD: &str = "chkDownloadZip";

pub const DEFAULT_WEBDRIVER_URL: &str = "http://127.0.0.1:9515";

/// Suffix Chromium gives a file while the download is still being written.
pub const IN_PROGRESS_SUFFIX: &str = ".crdownload";
/// Generic temporary-file suffix.
pub const TEMP_SUFFIX: &str = ".tmp";
pub const TEMPORARY_SUFFIXES: [&str; 2] = [IN_PROGRESS_SUFFIX, TEMP_SUFFIX];

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_ELEMENT_WAIT_SECS: u64 = 15;
pub const DEFAULT_SETTLE_MILLIS: u64 = 2_000;
pub const DEFAULT_INTER_ATTEMPT_PAUSE_SECS: u64 = 5;

/// Range fetched when neither `--from`/`--to` nor `--period` is given.
pub const DEFAULT_FIRST_PERIOD: &str = "2023-01";
pub const DEFAULT_LAST_PERIOD: &str = "2025-11";

pub const DOWNLOAD_DIR_NAME: &str = "bts_downloads";
pub const LEDGER_DIR_NAME: &str = "provenance";

pub const FIELD_SELECTION_WARNING: &str = "Could not select fields";
pub const NO_FILE_MESSAGE: &str = "No file downloaded - check download folder manually";
