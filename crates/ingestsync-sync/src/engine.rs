//! Polling synchronization engine

use crate::{
    copy::copy_package,
    discovery::PackageDiscoverer,
    fingerprint::{fingerprint, scan_entries},
    naming::FolderPattern,
    resolver::resolve_all,
    state::StateStore,
};
use chrono::Utc;
use ingestsync_config::MonitorConfig;
use ingestsync_types::{Error, Package, PackageState, Registry, Result};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Settings the engine runs with
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Directory watched for project-user folders
    pub source_root: PathBuf,
    /// Destination bases, later ones override earlier ones
    pub destination_bases: Vec<PathBuf>,
    /// Sleep between cycles
    pub check_interval: Duration,
    /// Unchanged cycles required before copying
    pub stability_threshold: u32,
    /// Failed copy attempts allowed per package
    pub retry_limit: u32,
    /// Path segments between project root and user folder
    pub ingest_prefix: Vec<String>,
    /// Folder naming regex
    pub folder_pattern: String,
    /// State file location
    pub state_file: PathBuf,
}

impl MonitorSettings {
    /// Build settings from the monitor configuration section
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        let source_root = config
            .source_directory
            .clone()
            .ok_or_else(|| Error::config("No source directory configured"))?;
        let state_file = config
            .state_file_path()
            .ok_or_else(|| Error::config("No state file location configured"))?;

        Ok(Self {
            source_root,
            destination_bases: config.destination_directories.clone(),
            check_interval: config.check_interval(),
            stability_threshold: config.stability_threshold,
            retry_limit: config.retry_limit,
            ingest_prefix: config.ingest_prefix_segments(),
            folder_pattern: config.folder_pattern().to_string(),
            state_file,
        })
    }
}

/// Summary of one polling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Cycle number, starting at 1
    pub cycle: u64,
    /// Packages in the registry after the cycle
    pub tracked: usize,
    /// Packages with no stable observation yet
    pub new: usize,
    /// Packages counting towards the threshold
    pub stabilizing: usize,
    /// Copy attempts made this cycle
    pub copy_attempts: usize,
    /// Packages verified and marked synced this cycle
    pub newly_synced: usize,
    /// Copy attempts that failed this cycle
    pub failed_attempts: usize,
    /// Packages out of retries
    pub stuck: usize,
    /// Packages synced overall
    pub synced: usize,
    /// Whether the registry was written to disk
    pub persisted: bool,
}

/// Result of one copy attempt for one package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptResult {
    Synced,
    Failed,
    Deferred,
}

/// The polling synchronization engine
#[derive(Debug)]
pub struct SyncEngine {
    settings: MonitorSettings,
    discoverer: PackageDiscoverer,
    store: StateStore,
    registry: Registry,
    cycle: u64,
}

impl SyncEngine {
    /// Create an engine, validating the source root and loading prior state
    pub async fn new(settings: MonitorSettings) -> Result<Self> {
        let source_is_dir = tokio::fs::metadata(&settings.source_root)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false);
        if !source_is_dir {
            return Err(Error::config(format!(
                "Source path is not a directory: {}",
                settings.source_root.display()
            )));
        }

        let pattern = FolderPattern::new(&settings.folder_pattern)?;
        let discoverer = PackageDiscoverer::new(
            settings.source_root.clone(),
            settings.ingest_prefix.clone(),
            pattern,
            settings.stability_threshold,
            settings.retry_limit,
        );
        let store = StateStore::new(settings.state_file.clone());
        let registry = store.load().await?;

        info!("Starting to monitor directory: {}", settings.source_root.display());
        info!(
            "Destination base directories: {}",
            settings
                .destination_bases
                .iter()
                .map(|base| base.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            settings,
            discoverer,
            store,
            registry,
            cycle: 0,
        })
    }

    /// Current registry snapshot
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Settings in use
    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Run one full cycle: discover, copy, persist.
    ///
    /// A discovery failure aborts the cycle and leaves the registry as it
    /// was. A persistence failure is logged and reported; the in-memory
    /// registry is kept and saved again next cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycle += 1;
        let span = info_span!("cycle", number = self.cycle);
        self.cycle_inner().instrument(span).await
    }

    async fn cycle_inner(&mut self) -> Result<CycleReport> {
        let discoverer = self.discoverer.clone();
        let bases = self.settings.destination_bases.clone();
        let previous = self.registry.clone();
        let span = Span::current();
        self.registry = spawn_blocking(move || {
            let _entered = span.enter();
            let index = resolve_all(&bases);
            discoverer.discover(&index, &previous)
        })
        .await
        .map_err(|e| Error::sync(format!("Discovery task join error: {}", e)))??;

        let mut report = self.sync_pass().await;

        match self.store.save(&self.registry).await {
            Ok(()) => report.persisted = true,
            Err(e) => error!("Failed to save folder states: {}", e),
        }

        info!(
            "Cycle {} complete: {} tracked, {} new, {} stabilizing, {} synced ({} this cycle), {} failed attempts, {} stuck",
            report.cycle,
            report.tracked,
            report.new,
            report.stabilizing,
            report.synced,
            report.newly_synced,
            report.failed_attempts,
            report.stuck
        );
        Ok(report)
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// Cycle errors are logged and the loop carries on. The shutdown future
    /// is only polled during the sleep, so a cycle always completes and
    /// persists before the loop exits.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            if let Err(e) = self.run_cycle().await {
                error!("Error during monitoring: {}", e);
            }

            debug!("Sleeping for {:?}", self.settings.check_interval);
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping monitor");
                    break;
                }
                () = tokio::time::sleep(self.settings.check_interval) => {}
            }
        }
    }

    /// Attempt copies for every eligible package, one at a time, and tally the results
    async fn sync_pass(&mut self) -> CycleReport {
        let threshold = self.settings.stability_threshold;
        let retry_limit = self.settings.retry_limit;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };

        for package in self.registry.values_mut() {
            if package.is_copy_eligible(threshold, retry_limit) {
                let mut attempt = package.clone();
                let span = Span::current();
                let joined = spawn_blocking(move || {
                    let _entered = span.enter();
                    let result = attempt_sync(&mut attempt, retry_limit);
                    (attempt, result)
                })
                .await;

                let result = match joined {
                    Ok((updated, result)) => {
                        *package = updated;
                        result
                    }
                    Err(e) => {
                        error!(
                            "Copy task for {} failed to complete: {}",
                            package.source_path.display(),
                            e
                        );
                        fail(package, retry_limit)
                    }
                };
                match result {
                    AttemptResult::Synced => report.newly_synced += 1,
                    AttemptResult::Failed => report.failed_attempts += 1,
                    AttemptResult::Deferred => {}
                }
                report.copy_attempts = report.newly_synced + report.failed_attempts;
            }

            match package.state(threshold, retry_limit) {
                PackageState::New => report.new += 1,
                PackageState::Stabilizing => report.stabilizing += 1,
                PackageState::Stable => {}
                PackageState::Stuck => {
                    report.stuck += 1;
                    warn!(
                        "Package {} is out of copy retries ({} of {})",
                        package.source_path.display(),
                        package.copy_retry_count,
                        retry_limit
                    );
                }
                PackageState::Synced => report.synced += 1,
            }
        }

        report.tracked = self.registry.len();
        report
    }
}

/// Copy one stable package and verify the destination against its fingerprint
fn attempt_sync(package: &mut Package, retry_limit: u32) -> AttemptResult {
    if !package.destination_project_path.is_dir() {
        debug!(
            "Destination project {} is not available, deferring {}",
            package.destination_project_path.display(),
            package.source_path.display()
        );
        return AttemptResult::Deferred;
    }

    let source = package.source_path.clone();
    let destination = package.destination_package_path.clone();
    info!("Copying files from {} to {}...", source.display(), destination.display());

    let copied = std::fs::create_dir_all(&destination)
        .map_err(|e| Error::io_at(&destination, e))
        .and_then(|()| scan_entries(&destination))
        .and_then(|known| copy_package(&source, &destination, &known));

    let outcome = match copied {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Copy of {} failed: {}", source.display(), e);
            return fail(package, retry_limit);
        }
    };

    if !outcome.copied() {
        warn!(
            "Nothing was copied from {} to {}, counting the attempt as failed",
            source.display(),
            destination.display()
        );
        return fail(package, retry_limit);
    }

    let verified = match fingerprint(&destination) {
        Ok(actual) => package.fingerprint.as_ref() == Some(&actual),
        Err(e) => {
            warn!("Failed to fingerprint destination {}: {}", destination.display(), e);
            return fail(package, retry_limit);
        }
    };

    if verified {
        package.mark_synced(Utc::now());
        info!(
            "Package {} successfully copied to {} ({} files, {} bytes)",
            source.display(),
            destination.display(),
            outcome.files_copied,
            outcome.bytes_copied
        );
        return AttemptResult::Synced;
    }

    warn!(
        "Package {} was not fully copied to {}: destination does not match source",
        source.display(),
        destination.display()
    );
    fail(package, retry_limit)
}

fn fail(package: &mut Package, retry_limit: u32) -> AttemptResult {
    package.record_copy_failure();
    if package.copy_retry_count >= retry_limit {
        warn!(
            "Package {} reached the retry limit ({}); it will not be copied again until its state entry is cleared",
            package.source_path.display(),
            retry_limit
        );
    }
    AttemptResult::Failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestsync_config::NamingConvention;
    use ingestsync_types::normalize_path;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                temp: TempDir::new().unwrap(),
            };
            fs::create_dir_all(fixture.source()).unwrap();
            fs::create_dir_all(fixture.destination().join("acme")).unwrap();
            fixture
        }

        fn source(&self) -> PathBuf {
            self.temp.path().join("source")
        }

        fn destination(&self) -> PathBuf {
            self.temp.path().join("destination")
        }

        fn write(&self, relative: &str, size: usize) {
            let path = self.source().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, vec![b'x'; size]).unwrap();
        }

        fn settings(&self, threshold: u32, retry_limit: u32) -> MonitorSettings {
            MonitorSettings {
                source_root: self.source(),
                destination_bases: vec![self.destination()],
                check_interval: Duration::from_millis(10),
                stability_threshold: threshold,
                retry_limit,
                ingest_prefix: vec!["in".to_string(), "vendors".to_string()],
                folder_pattern: NamingConvention::Plain.pattern().to_string(),
                state_file: self.source().join("folder_states.json"),
            }
        }

        fn key(&self, relative: &str) -> String {
            normalize_path(&self.source().join(relative))
        }
    }

    fn package_at<'a>(engine: &'a SyncEngine, key: &str) -> &'a Package {
        &engine.registry()[key]
    }

    #[tokio::test]
    async fn test_new_rejects_missing_source() {
        let fixture = Fixture::new();
        let mut settings = fixture.settings(2, 1);
        settings.source_root = fixture.temp.path().join("missing");

        let result = SyncEngine::new(settings).await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_new_rejects_bad_pattern() {
        let fixture = Fixture::new();
        let mut settings = fixture.settings(2, 1);
        settings.folder_pattern = "^(?P<project>.*)$".to_string();

        let result = SyncEngine::new(settings).await;
        assert!(matches!(result, Err(Error::Naming { .. })));
    }

    #[tokio::test]
    async fn test_syncs_after_threshold_is_exceeded() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        fixture.write("acme-alice/batch1/b.txt", 20);
        let key = fixture.key("acme-alice/batch1");
        let mut engine = SyncEngine::new(fixture.settings(2, 1)).await.unwrap();

        for expected in 0..3 {
            let report = engine.run_cycle().await.unwrap();
            assert_eq!(report.copy_attempts, 0);
            assert_eq!(package_at(&engine, &key).stable_count, expected);
        }

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.newly_synced, 1);
        assert!(report.persisted);

        let package = package_at(&engine, &key);
        assert!(package.synced);
        assert!(package.copied_at.is_some());
        let target = fixture.destination().join("acme/in/vendors/alice/batch1");
        assert_eq!(fs::metadata(target.join("a.txt")).unwrap().len(), 10);
        assert_eq!(fs::metadata(target.join("b.txt")).unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_synced_package_stays_put() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        let key = fixture.key("acme-alice/batch1");
        let mut engine = SyncEngine::new(fixture.settings(0, 1)).await.unwrap();

        engine.run_cycle().await.unwrap();
        engine.run_cycle().await.unwrap();
        let synced = package_at(&engine, &key).clone();
        assert!(synced.synced);

        fixture.write("acme-alice/batch1/late.txt", 3);
        for _ in 0..3 {
            let report = engine.run_cycle().await.unwrap();
            assert_eq!(report.copy_attempts, 0);
        }

        assert_eq!(package_at(&engine, &key), &synced);
        let target = fixture.destination().join("acme/in/vendors/alice/batch1");
        assert!(!target.join("late.txt").exists());
    }

    #[tokio::test]
    async fn test_verification_mismatch_burns_retries() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        let key = fixture.key("acme-alice/batch1");
        // A stray file at the destination keeps verification failing.
        let target = fixture.destination().join("acme/in/vendors/alice/batch1");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stray.txt"), b"left over").unwrap();

        let mut engine = SyncEngine::new(fixture.settings(0, 2)).await.unwrap();
        engine.run_cycle().await.unwrap();

        let mut failures = 0;
        for _ in 0..5 {
            failures += engine.run_cycle().await.unwrap().failed_attempts;
        }

        let package = package_at(&engine, &key);
        assert_eq!(failures, 2);
        assert_eq!(package.copy_retry_count, 2);
        assert!(!package.synced);
        assert_eq!(package.state(0, 2), PackageState::Stuck);
    }

    #[tokio::test]
    async fn test_nothing_copied_counts_as_failed_attempt() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        let key = fixture.key("acme-alice/batch1");
        // Destination already holds every file with the same size.
        let target = fixture.destination().join("acme/in/vendors/alice/batch1");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("a.txt"), vec![b'x'; 10]).unwrap();

        let mut engine = SyncEngine::new(fixture.settings(0, 1)).await.unwrap();
        engine.run_cycle().await.unwrap();
        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.newly_synced, 0);
        assert_eq!(report.failed_attempts, 1);
        let package = package_at(&engine, &key);
        assert!(!package.synced);
        assert_eq!(package.copy_retry_count, 1);
        assert_eq!(package.state(0, 1), PackageState::Stuck);

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.copy_attempts, 0);
        assert_eq!(report.stuck, 1);
    }

    #[tokio::test]
    async fn test_unknown_project_never_registers() {
        let fixture = Fixture::new();
        fixture.write("zorp-bob/batch1/a.txt", 10);
        let mut engine = SyncEngine::new(fixture.settings(0, 1)).await.unwrap();

        for _ in 0..3 {
            engine.run_cycle().await.unwrap();
            assert!(engine.registry().is_empty());
        }

        fs::create_dir_all(fixture.destination().join("zorp")).unwrap();
        engine.run_cycle().await.unwrap();
        assert!(engine.registry().contains_key(&fixture.key("zorp-bob/batch1")));
    }

    #[tokio::test]
    async fn test_restart_resumes_counters() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        let key = fixture.key("acme-alice/batch1");

        {
            let mut engine = SyncEngine::new(fixture.settings(3, 1)).await.unwrap();
            engine.run_cycle().await.unwrap();
            engine.run_cycle().await.unwrap();
            assert_eq!(package_at(&engine, &key).stable_count, 1);
        }

        let mut engine = SyncEngine::new(fixture.settings(3, 1)).await.unwrap();
        assert_eq!(package_at(&engine, &key).stable_count, 1);
        engine.run_cycle().await.unwrap();
        assert_eq!(package_at(&engine, &key).stable_count, 2);
    }

    #[tokio::test]
    async fn test_missing_destination_project_defers_copy() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        let key = fixture.key("acme-alice/batch1");
        let mut engine = SyncEngine::new(fixture.settings(0, 1)).await.unwrap();
        engine.run_cycle().await.unwrap();

        fs::remove_dir_all(fixture.destination().join("acme")).unwrap();
        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.copy_attempts, 0);
        let package = package_at(&engine, &key);
        assert!(!package.synced);
        assert_eq!(package.copy_retry_count, 0);
    }

    #[tokio::test]
    async fn test_unwritable_state_keeps_registry() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        let mut settings = fixture.settings(2, 1);
        settings.state_file = fixture.temp.path().join("state-dir");
        let mut engine = SyncEngine::new(settings).await.unwrap();

        // A non-empty directory where the state file should be makes the rename fail.
        fs::create_dir_all(fixture.temp.path().join("state-dir/occupied")).unwrap();
        let report = engine.run_cycle().await.unwrap();

        assert!(!report.persisted);
        assert_eq!(engine.registry().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        let mut engine = SyncEngine::new(fixture.settings(0, 1)).await.unwrap();

        let shutdown = tokio::time::sleep(Duration::from_millis(25));
        engine.run(shutdown).await;

        assert!(engine.cycle >= 2);
        assert!(package_at(&engine, &fixture.key("acme-alice/batch1")).synced);
        assert!(fixture.source().join("folder_states.json").exists());
    }

    #[tokio::test]
    async fn test_settings_from_config() {
        let config = MonitorConfig {
            source_directory: Some(PathBuf::from("/data/incoming")),
            destination_directories: vec![PathBuf::from("/mnt/projects")],
            ingest_prefix: "/drop//vendors/".to_string(),
            ..MonitorConfig::default()
        };

        let settings = MonitorSettings::from_config(&config).unwrap();
        assert_eq!(settings.ingest_prefix, ["drop", "vendors"]);
        assert_eq!(
            settings.state_file,
            PathBuf::from("/data/incoming/folder_states.json")
        );
        assert_eq!(settings.check_interval, Duration::from_secs(10));

        let missing = MonitorSettings::from_config(&MonitorConfig::default());
        assert!(missing.is_err());
    }
}
