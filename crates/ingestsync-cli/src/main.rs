//! IngestSync - polling directory synchronization daemon
//!
//! Watches a source directory for `<project>-<user>` folders and copies each
//! package inside them into the matching project of a destination base once
//! its contents have stopped changing.

mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use ingestsync_config::{Config, ConfigLoader, NamingConvention};
use ingestsync_sync::{MonitorSettings, SyncEngine};
use std::path::PathBuf;
use tracing::{error, info};

/// IngestSync - polling directory synchronization daemon
#[derive(Parser, Debug)]
#[command(
    name = "ingestsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Copy stable vendor packages from a drop folder into project directories",
    long_about = "IngestSync polls a source directory for <project>-<user> folders.\n\
                  Every package folder inside them is copied to\n\
                  <destination>/<project>/<ingest prefix>/<user>/<package> once its\n\
                  file listing has stayed unchanged for the configured number of checks."
)]
struct Cli {
    /// Directory to monitor
    source_directory: Option<PathBuf>,

    /// Destination base directories holding project folders; later ones win
    destination_directories: Vec<PathBuf>,

    /// Seconds between checks
    #[arg(long = "check_interval")]
    check_interval: Option<u64>,

    /// Unchanged checks required before a package is copied
    #[arg(long = "number_of_checks")]
    number_of_checks: Option<u32>,

    /// Failed copy attempts allowed per package
    #[arg(long = "retry_limit")]
    retry_limit: Option<u32>,

    /// Relative path between project folder and user folder
    #[arg(long = "ingest_prefix")]
    ingest_prefix: Option<String>,

    /// Logging level
    #[arg(long = "log_level", value_enum, ignore_case = true)]
    log_level: Option<LogLevelArg>,

    /// Folder naming convention
    #[arg(long, value_enum)]
    naming: Option<NamingArg>,

    /// Custom folder regex with `project` and `user` named groups
    #[arg(long = "folder_pattern")]
    folder_pattern: Option<String>,

    /// State file location (default: <source>/folder_states.json)
    #[arg(long = "state_file")]
    state_file: Option<PathBuf>,

    /// Directory for log files
    #[arg(long = "log_dir")]
    log_dir: Option<PathBuf>,

    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single check and exit
    #[arg(long)]
    once: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogLevelArg {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevelArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum NamingArg {
    Plain,
    InSuffix,
}

impl From<NamingArg> for NamingConvention {
    fn from(naming: NamingArg) -> Self {
        match naming {
            NamingArg::Plain => NamingConvention::Plain,
            NamingArg::InSuffix => NamingConvention::InSuffix,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let _log_guard = logging::init_logging(&config.logging)?;

    info!("IngestSync v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = MonitorSettings::from_config(&config.monitor)
        .context("A source directory is required")?;
    let mut engine = match SyncEngine::new(settings).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to start monitoring: {}", e);
            return Err(e).context("Failed to start monitoring");
        }
    };

    if cli.once {
        let report = engine.run_cycle().await.context("Check failed")?;
        info!(
            "Single check finished: {} packages tracked, {} synced",
            report.tracked, report.synced
        );
        return Ok(());
    }

    engine.run(shutdown_signal()).await;
    info!("Monitoring stopped");
    Ok(())
}

/// Load configuration from file and environment, then apply command line overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigLoader::load_default().context("Failed to load configuration")?,
    };

    apply_overrides(cli, &mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn apply_overrides(cli: &Cli, config: &mut Config) {
    let monitor = &mut config.monitor;
    if let Some(source) = &cli.source_directory {
        monitor.source_directory = Some(source.clone());
    }
    if !cli.destination_directories.is_empty() {
        monitor.destination_directories = cli.destination_directories.clone();
    }
    if let Some(interval) = cli.check_interval {
        monitor.check_interval_secs = interval;
    }
    if let Some(checks) = cli.number_of_checks {
        monitor.stability_threshold = checks;
    }
    if let Some(limit) = cli.retry_limit {
        monitor.retry_limit = limit;
    }
    if let Some(prefix) = &cli.ingest_prefix {
        monitor.ingest_prefix = prefix.clone();
    }
    if let Some(naming) = cli.naming {
        monitor.naming = naming.into();
    }
    if let Some(pattern) = &cli.folder_pattern {
        monitor.folder_pattern = Some(pattern.clone());
    }
    if let Some(state_file) = &cli.state_file {
        monitor.state_file = Some(state_file.clone());
    }

    if let Some(level) = cli.log_level {
        config.logging.level = level.as_str().to_string();
    }
    if let Some(log_dir) = &cli.log_dir {
        config.logging.log_dir = Some(log_dir.clone());
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
