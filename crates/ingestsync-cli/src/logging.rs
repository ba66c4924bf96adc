//! Console and file logging setup

use anyhow::{Context, Result};
use chrono::Local;
use ingestsync_config::LoggingConfig;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Initialize the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. When a log
/// directory is configured, records are also written to a timestamped file
/// there; the returned guard must be held until exit so buffered lines are
/// flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = config.level.to_ascii_lowercase();

    let mut log_guard = None;
    let mut log_path = None;
    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let path = log_file_path(dir);
            let file_name = path
                .file_name()
                .context("Log file path has no file name")?;
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            log_guard = Some(guard);
            log_path = Some(path);
            Some(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(env_filter(&level)),
            )
        }
        None => None,
    };

    let console_layer = if config.json_format {
        fmt::layer()
            .json()
            .with_target(false)
            .with_filter(env_filter(&level))
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_ansi(config.colored_output)
            .with_filter(env_filter(&level))
            .boxed()
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    if let Some(path) = &log_path {
        tracing::info!("Logging to {}", path.display());
    }
    Ok(log_guard)
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// `<dir>/folder_monitor_<YYYYmmdd_HHMMSS>.log`
fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "folder_monitor_{}.log",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}
