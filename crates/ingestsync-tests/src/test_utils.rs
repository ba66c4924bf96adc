//! Unified test utilities for IngestSync tests
//!
//! Builds scratch source and destination trees so scenario tests can drive
//! the engine cycle by cycle.

use ingestsync_config::{MonitorConfig, NamingConvention};
use ingestsync_sync::MonitorSettings;
use ingestsync_types::normalize_path;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Write `size` bytes to `path`, creating parent directories
pub fn create_test_file(path: &Path, size: usize) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(path, "A".repeat(size)).expect("Failed to write test file");
    path.to_path_buf()
}

/// Scratch source directory plus one or more destination bases
pub struct SyncFixture {
    temp_dir: TempDir,
    bases: usize,
}

impl SyncFixture {
    /// Fixture with a single destination base
    pub fn new() -> Self {
        Self::with_bases(1)
    }

    /// Fixture with `bases` destination bases named `dest0`, `dest1`, ...
    pub fn with_bases(bases: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(temp_dir.path().join("source")).expect("Failed to create source");
        for index in 0..bases {
            fs::create_dir_all(temp_dir.path().join(format!("dest{}", index)))
                .expect("Failed to create destination base");
        }
        Self { temp_dir, bases }
    }

    /// Root of the scratch tree
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Monitored source directory
    pub fn source(&self) -> PathBuf {
        self.root().join("source")
    }

    /// Destination base by index
    pub fn base(&self, index: usize) -> PathBuf {
        self.root().join(format!("dest{}", index))
    }

    /// All destination bases in order
    pub fn bases(&self) -> Vec<PathBuf> {
        (0..self.bases).map(|index| self.base(index)).collect()
    }

    /// Create a project folder in the given base
    pub fn create_project(&self, base: usize, project: &str) -> PathBuf {
        let path = self.base(base).join(project);
        fs::create_dir_all(&path).expect("Failed to create project");
        path
    }

    /// Write a file relative to the source directory
    pub fn write_source(&self, relative: &str, size: usize) -> PathBuf {
        create_test_file(&self.source().join(relative), size)
    }

    /// Registry key of a package folder relative to the source directory
    pub fn key(&self, relative: &str) -> String {
        normalize_path(&self.source().join(relative))
    }

    /// Where a package lands under `in/vendors`
    pub fn destination_package(&self, base: usize, project: &str, user: &str, package: &str) -> PathBuf {
        self.base(base)
            .join(project)
            .join("in")
            .join("vendors")
            .join(user)
            .join(package)
    }

    /// Default state file location
    pub fn state_file(&self) -> PathBuf {
        self.source().join("folder_states.json")
    }

    /// Monitor configuration over this fixture
    pub fn monitor_config(&self, threshold: u32, retry_limit: u32) -> MonitorConfig {
        MonitorConfig {
            source_directory: Some(self.source()),
            destination_directories: self.bases(),
            check_interval_secs: 1,
            stability_threshold: threshold,
            retry_limit,
            naming: NamingConvention::Plain,
            ..MonitorConfig::default()
        }
    }

    /// Engine settings with a short interval
    pub fn settings(&self, threshold: u32, retry_limit: u32) -> MonitorSettings {
        let mut settings = MonitorSettings::from_config(&self.monitor_config(threshold, retry_limit))
            .expect("Fixture configuration is complete");
        settings.check_interval = Duration::from_millis(10);
        settings
    }
}

impl Default for SyncFixture {
    fn default() -> Self {
        Self::new()
    }
}
