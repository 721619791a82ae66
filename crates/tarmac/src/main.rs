//! Tarmac CLI
//!
//! `tarmac fetch` runs a download session, `tarmac summary` prints the report of
//! a persisted ledger, `tarmac config` shows the resolved configuration.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tarmac::{
    plan_periods, AttemptSettings, DownloadAttempt, ResolvedPaths, SessionController,
    SessionOptions, TarmacConfig,
};
use tarmac_ledger::{render_summary, LedgerGuard, ProvenanceLedger, SessionMetadata};
use tarmac_logging::{init_logging, LogConfig};
use tarmac_protocol::defaults::{DEFAULT_FIRST_PERIOD, DEFAULT_LAST_PERIOD};
use tarmac_protocol::{paths, CancellationToken, DownloadOutcome, Period, SystemClock};
use tarmac_watch::FsListing;
use tarmac_webdriver::{BrowserDriver, ClientOptions, WebDriverClient};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tarmac", version, about = "Batch downloader for BTS On-Time Performance exports")]
struct Cli {
    /// Enable verbose logging (debug detail to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.tarmac/config.toml)
    #[arg(long, global = true, env = "TARMAC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download one export per month and record provenance
    Fetch(FetchArgs),

    /// Print the summary report of a provenance ledger
    Summary {
        /// Path to a provenance_log_*.json file
        ledger: PathBuf,
    },

    /// Show the resolved configuration and paths
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// First month of the range (YYYY-MM)
    #[arg(long, default_value = DEFAULT_FIRST_PERIOD)]
    from: Period,

    /// Last month of the range, inclusive (YYYY-MM)
    #[arg(long, default_value = DEFAULT_LAST_PERIOD)]
    to: Period,

    /// Explicit months to fetch instead of a range; repeatable
    #[arg(long = "period", conflicts_with_all = ["from", "to"])]
    periods: Vec<Period>,

    /// Field token to select (substring of label, value, name or id); repeatable
    #[arg(long = "field")]
    fields: Vec<String>,

    /// Directory the browser downloads into
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// WebDriver endpoint (chromedriver)
    #[arg(long)]
    webdriver: Option<String>,

    /// Run the browser headless
    #[arg(long)]
    headless: bool,

    /// Fetch the first month alone and stop if it fails
    #[arg(long)]
    probe_first: bool,

    /// After a successful probe, ask before fetching the rest
    #[arg(long, requires = "probe_first")]
    confirm: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "tarmac",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        eprintln!("Warning: failed to initialize file logging: {:?}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let config = TarmacConfig::load_or_default(cli.config.as_deref(), &paths::default_config_path())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, config),
        Commands::Summary { ledger } => run_summary(&ledger),
        Commands::Config { json } => show_config(&config, cli.config.as_deref(), json),
    }
}

fn run_fetch(args: FetchArgs, mut config: TarmacConfig) -> Result<()> {
    if let Some(dir) = args.download_dir {
        config.paths.download_dir = dir;
    }
    if let Some(endpoint) = args.webdriver {
        config.webdriver.endpoint = endpoint;
    }
    config.webdriver.headless |= args.headless;

    let desired = if args.fields.is_empty() {
        config.form.fields.clone()
    } else {
        args.fields
    };
    let periods = plan_periods(args.from, args.to, &args.periods);
    if periods.is_empty() {
        bail!("No months to fetch: {} is after {}", args.from, args.to);
    }

    let ResolvedPaths {
        download_dir,
        ledger_dir,
    } = config.paths.resolve()?;
    std::fs::create_dir_all(&download_dir).with_context(|| {
        format!("Failed to create download directory: {}", download_dir.display())
    })?;

    info!("Files will be downloaded to: {}", download_dir.display());
    info!("Will select these fields: {:?}", desired);
    info!(
        "Fetching {} month(s): {} .. {}",
        periods.len(),
        periods[0],
        periods[periods.len() - 1]
    );

    let cancel = CancellationToken::new();
    install_signal_handlers(cancel.clone())?;

    let metadata = SessionMetadata {
        source_url: config.source.url.clone(),
        data_source: config.source.data_source.clone(),
        dataset: config.source.dataset.clone(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let mut ledger = LedgerGuard::new(
        ProvenanceLedger::create(&ledger_dir, metadata)
            .context("Failed to create provenance ledger")?,
    );

    let mut driver = WebDriverClient::connect(
        &config.webdriver.endpoint,
        &ClientOptions {
            download_dir: download_dir.clone(),
            headless: config.webdriver.headless,
            request_timeout: Duration::from_secs(config.webdriver.request_timeout_secs),
        },
    )
    .with_context(|| {
        format!(
            "Failed to start a browser session at {}",
            config.webdriver.endpoint
        )
    })?;

    let settings = AttemptSettings::from_config(&config);
    let clock = SystemClock;
    let listing = FsListing;
    let remaining = periods.len().saturating_sub(1);

    let tally = {
        let attempt =
            DownloadAttempt::new(&mut driver, &clock, &listing, &settings, &download_dir);
        let options = SessionOptions {
            inter_attempt_pause: config.timing.inter_attempt_pause(),
            probe_first: args.probe_first,
        };
        let mut session = SessionController::new(attempt, &mut ledger, options, cancel.clone());
        if args.confirm {
            session = session.with_confirmation(Box::new(move |outcome: &DownloadOutcome| {
                confirm_on_stdin(outcome, remaining)
            }));
        }
        session.run(&periods, &desired)
    };

    let summary_path = ledger
        .seal(tally.succeeded, tally.failed)
        .context("Failed to seal provenance ledger")?;

    if let Err(e) = driver.quit() {
        warn!("Failed to close browser session: {}", e);
    }

    println!();
    println!("{}", "=".repeat(50));
    println!("Download process completed!");
    println!("Successful: {}", tally.succeeded);
    println!("Failed: {}", tally.failed);
    println!("Check {} for your files", download_dir.display());
    println!("Provenance log: {}", ledger.path().display());
    println!("Summary report: {}", summary_path.display());
    println!("{}", "=".repeat(50));
    Ok(())
}

fn confirm_on_stdin(outcome: &DownloadOutcome, remaining: usize) -> bool {
    println!(
        "Probe download complete: {}",
        outcome.filename().unwrap_or_default()
    );
    print!(
        "Press Enter to continue with the remaining {} month(s), or type 'q' to stop: ",
        remaining
    );
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => !line.trim().eq_ignore_ascii_case("q"),
    }
}

fn run_summary(path: &Path) -> Result<()> {
    let document = ProvenanceLedger::load(path)
        .with_context(|| format!("Failed to read provenance ledger: {}", path.display()))?;
    print!("{}", render_summary(&document));
    Ok(())
}

fn show_config(config: &TarmacConfig, explicit: Option<&Path>, json: bool) -> Result<()> {
    let config_path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(paths::default_config_path);
    let ResolvedPaths {
        download_dir,
        ledger_dir,
    } = config.paths.resolve()?;

    if json {
        let output = serde_json::json!({
            "config_path": config_path,
            "config_file_exists": config_path.exists(),
            "tarmac_home": paths::tarmac_home(),
            "logs_dir": paths::default_logs_dir(),
            "download_dir": download_dir,
            "ledger_dir": ledger_dir,
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let missing = if config_path.exists() {
        ""
    } else {
        " (not found, using defaults)"
    };
    println!("Config file:  {}{}", config_path.display(), missing);
    println!("Tarmac home:  {}", paths::tarmac_home().display());
    println!("Logs:         {}", paths::default_logs_dir().display());
    println!("Downloads:    {}", download_dir.display());
    println!("Provenance:   {}", ledger_dir.display());
    println!();
    print!("{}", config.to_toml_string()?);
    Ok(())
}

/// Flip `cancel` on SIGINT/SIGTERM (Ctrl+C on Windows).
///
/// The session finishes the attempt in flight, then seals the ledger.
fn install_signal_handlers(cancel: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
        std::thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("Received signal {}, stopping after the current download...", sig);
                cancel.cancel();
            }
        });
    }

    #[cfg(windows)]
    {
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, stopping after the current download...");
            cancel.cancel();
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    Ok(())
}
