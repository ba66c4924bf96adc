//! Configuration management system for IngestSync
//!
//! Configuration is layered: built-in defaults, then an optional YAML/TOML/JSON
//! file, then `INGESTSYNC__*` environment variables. The CLI applies its own
//! flags on top and validates the result once before the daemon starts.
//!
//! # Examples
//!
//! ```rust
//! use ingestsync_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("ingestsync.yaml")
//!     .add_env_prefix("INGESTSYNC")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Polling every {:?}", config.monitor.check_interval());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Name of the state file kept inside the monitored source directory
pub const STATE_FILE_NAME: &str = "folder_states.json";

/// Log levels accepted by the logging configuration
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for IngestSync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Polling and synchronization settings
    pub monitor: MonitorConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        self.monitor.validate()?;
        self.logging.validate()
    }
}

/// Folder naming convention for project-user directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingConvention {
    /// `<project>-<user>`
    #[default]
    Plain,
    /// `<project>-<user>-In`
    InSuffix,
}

impl NamingConvention {
    /// Regular expression for this convention
    pub fn pattern(self) -> &'static str {
        match self {
            Self::Plain => r"^(?P<project>[^-]+)-(?P<user>[^-]+)$",
            Self::InSuffix => r"^(?P<project>[^-]+)-(?P<user>[^-]+)-In$",
        }
    }
}

/// Polling and synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Directory watched for project-user folders
    #[serde(default)]
    pub source_directory: Option<PathBuf>,
    /// Destination bases searched for project folders, later ones win
    #[serde(default)]
    pub destination_directories: Vec<PathBuf>,
    /// Seconds to sleep between polling cycles
    pub check_interval_secs: u64,
    /// Unchanged cycles required before a package may be copied
    pub stability_threshold: u32,
    /// Failed copy attempts allowed per package
    pub retry_limit: u32,
    /// Relative path inserted between project root and user folder
    pub ingest_prefix: String,
    /// Naming convention for project-user folders
    #[serde(default)]
    pub naming: NamingConvention,
    /// Custom folder regex with `project` and `user` groups; overrides `naming`
    #[serde(default)]
    pub folder_pattern: Option<String>,
    /// State file location; defaults to `<source>/folder_states.json`
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            source_directory: None,
            destination_directories: Vec::new(),
            check_interval_secs: 10,
            stability_threshold: 3,
            retry_limit: 2,
            ingest_prefix: "in/vendors".to_string(),
            naming: NamingConvention::default(),
            folder_pattern: None,
            state_file: None,
        }
    }
}

impl MonitorConfig {
    /// Interval between polling cycles
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Effective folder pattern
    pub fn folder_pattern(&self) -> &str {
        self.folder_pattern
            .as_deref()
            .unwrap_or_else(|| self.naming.pattern())
    }

    /// Non-empty segments of the ingest prefix
    pub fn ingest_prefix_segments(&self) -> Vec<String> {
        self.ingest_prefix
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Effective state file path, if a source directory is known
    pub fn state_file_path(&self) -> Option<PathBuf> {
        self.state_file.clone().or_else(|| {
            self.source_directory
                .as_ref()
                .map(|source| source.join(STATE_FILE_NAME))
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.check_interval_secs == 0 {
            return Err(ConfigError::validation(
                "Check interval must be at least 1 second",
            ));
        }

        if self.ingest_prefix_segments().is_empty() {
            return Err(ConfigError::validation(
                "Ingest prefix must contain at least one path segment",
            ));
        }

        if self.source_directory.is_some() && self.destination_directories.is_empty() {
            return Err(ConfigError::validation(
                "At least one destination directory is required",
            ));
        }

        let pattern = self.folder_pattern();
        let regex = regex::Regex::new(pattern)
            .map_err(|e| ConfigError::invalid_value("folder_pattern", e.to_string()))?;
        let names: Vec<_> = regex.capture_names().flatten().collect();
        if !names.contains(&"project") || !names.contains(&"user") {
            return Err(ConfigError::invalid_value(
                "folder_pattern",
                "pattern must define `project` and `user` named groups",
            ));
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Directory for the log file; file logging is off when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Enable JSON formatting
    pub json_format: bool,
    /// Enable colored console output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            json_format: false,
            colored_output: true,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> ConfigResult<()> {
        let level = self.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }
        Ok(())
    }
}
