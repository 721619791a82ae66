//! Logging setup for the Tarmac binary.
//!
//! Two `tracing` layers: a size-rotated plain-text file under the Tarmac home
//! directory, and a human-facing stderr layer that narrates each download step.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "tarmac=info,tarmac_watch=info,tarmac_ledger=info,tarmac_webdriver=warn";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror debug detail (poll ticks, WebDriver calls) to stderr.
    pub verbose: bool,
    /// Override for the log directory; defaults to `~/.tarmac/logs`.
    pub log_dir: Option<PathBuf>,
}

/// Initialize tracing with a rotating file writer and stderr output.
///
/// `RUST_LOG` overrides the default filter for both layers.
pub fn init_logging(config: LogConfig<'_>) -> Result<PathBuf> {
    let log_dir = config
        .log_dir
        .unwrap_or_else(tarmac_protocol::paths::default_logs_dir);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create logs directory: {}", log_dir.display()))?;

    let writer = SharedLogWriter::open(&log_dir, config.app_name)
        .context("Failed to initialize rotating log writer")?;
    let log_path = writer.path();

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::new(format!("{},tarmac=debug,tarmac_watch=debug", DEFAULT_LOG_FILTER))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(log_path)
}

/// Append-only log file that rolls over to `<name>.log.1 .. <name>.log.N`.
struct RotatingLog {
    dir: PathBuf,
    stem: String,
    keep: usize,
    limit: u64,
    file: Option<File>,
    written: u64,
}

impl RotatingLog {
    fn open(dir: &Path, app_name: &str, keep: usize, limit: u64) -> io::Result<Self> {
        let mut log = Self {
            dir: dir.to_path_buf(),
            stem: file_stem(app_name),
            keep: keep.max(1),
            limit,
            file: None,
            written: 0,
        };
        log.reopen()?;
        if log.written > log.limit {
            log.roll()?;
        }
        Ok(log)
    }

    fn live_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.stem))
    }

    fn archive_path(&self, generation: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.stem, generation))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.live_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
        self.shift_archives()?;
        self.reopen()
    }

    // live -> .1 -> .2 ... the oldest generation falls off the end.
    fn shift_archives(&self) -> io::Result<()> {
        let oldest = self.keep - 1;
        if oldest == 0 {
            return fs::remove_file(self.live_path()).or_else(ignore_missing);
        }
        fs::remove_file(self.archive_path(oldest)).or_else(ignore_missing)?;
        for generation in (1..oldest).rev() {
            let from = self.archive_path(generation);
            if from.exists() {
                fs::rename(&from, self.archive_path(generation + 1))?;
            }
        }
        let live = self.live_path();
        if live.exists() {
            fs::rename(live, self.archive_path(1))?;
        }
        Ok(())
    }
}

fn ignore_missing(err: io::Error) -> io::Result<()> {
    if err.kind() == io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(err)
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.limit {
            self.roll()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
struct SharedLogWriter {
    inner: Arc<Mutex<RotatingLog>>,
}

impl SharedLogWriter {
    fn open(dir: &Path, app_name: &str) -> io::Result<Self> {
        let log = RotatingLog::open(dir, app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(log)),
        })
    }

    fn path(&self) -> PathBuf {
        match self.inner.lock() {
            Ok(log) => log.live_path(),
            Err(poisoned) => poisoned.into_inner().live_path(),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogWriter {
    type Writer = SharedLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for SharedLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .flush()
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_stem_replaces_separators() {
        assert_eq!(file_stem("tarmac fetch/2023"), "tarmac_fetch_2023");
        assert_eq!(file_stem("tarmac-cli_v1"), "tarmac-cli_v1");
    }

    #[test]
    fn test_rolls_over_when_limit_exceeded() {
        let dir = tempdir().unwrap();
        let mut log = RotatingLog::open(dir.path(), "tarmac", 3, 16).unwrap();

        log.write_all(b"0123456789\n").unwrap();
        log.write_all(b"abcdefghij\n").unwrap();
        log.flush().unwrap();

        let live = fs::read_to_string(dir.path().join("tarmac.log")).unwrap();
        let archived = fs::read_to_string(dir.path().join("tarmac.log.1")).unwrap();
        assert_eq!(live, "abcdefghij\n");
        assert_eq!(archived, "0123456789\n");
    }

    #[test]
    fn test_keeps_bounded_number_of_archives() {
        let dir = tempdir().unwrap();
        let mut log = RotatingLog::open(dir.path(), "tarmac", 3, 4).unwrap();

        for line in ["aaaa", "bbbb", "cccc", "dddd", "eeee"] {
            log.write_all(line.as_bytes()).unwrap();
        }
        log.flush().unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("tarmac.log")).unwrap(), "eeee");
        assert_eq!(fs::read_to_string(dir.path().join("tarmac.log.1")).unwrap(), "dddd");
        assert_eq!(fs::read_to_string(dir.path().join("tarmac.log.2")).unwrap(), "cccc");
        assert!(!dir.path().join("tarmac.log.3").exists());
    }
}
