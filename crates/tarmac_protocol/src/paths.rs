//! Per-user locations: `TARMAC_HOME`, else `~/.tarmac`, else `./.tarmac`.

use std::env;
use std::path::PathBuf;

pub const HOME_ENV: &str = "TARMAC_HOME";
const HOME_DIR_NAME: &str = ".tarmac";

pub fn tarmac_home() -> PathBuf {
    if let Some(dir) = env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    ["HOME", "USERPROFILE"]
        .iter()
        .find_map(|key| env::var_os(key).filter(|v| !v.is_empty()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HOME_DIR_NAME)
}

/// Rotated log files live here.
pub fn default_logs_dir() -> PathBuf {
    tarmac_home().join("logs")
}

pub fn default_config_path() -> PathBuf {
    tarmac_home().join("config.toml")
}
