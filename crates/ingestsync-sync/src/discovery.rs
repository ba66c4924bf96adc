//! Package discovery and stability tracking

use crate::fingerprint::fingerprint;
use crate::naming::FolderPattern;
use crate::resolver::list_subdirectories;
use ingestsync_types::{
    normalize_path, DestinationIndex, Error, Observation, Package, Registry, Result,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Walks the source root and produces the next registry snapshot
#[derive(Debug, Clone)]
pub struct PackageDiscoverer {
    source_root: PathBuf,
    ingest_prefix: Vec<String>,
    pattern: FolderPattern,
    stability_threshold: u32,
    retry_limit: u32,
}

impl PackageDiscoverer {
    /// Create a discoverer
    pub fn new(
        source_root: impl Into<PathBuf>,
        ingest_prefix: Vec<String>,
        pattern: FolderPattern,
        stability_threshold: u32,
        retry_limit: u32,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            ingest_prefix,
            pattern,
            stability_threshold,
            retry_limit,
        }
    }

    /// Source root being watched
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Destination of a package inside a project root
    pub fn destination_package_path(
        &self,
        project_root: &Path,
        user_name: &str,
        package_name: &str,
    ) -> PathBuf {
        let mut path = project_root.to_path_buf();
        for segment in &self.ingest_prefix {
            path.push(segment);
        }
        path.push(user_name);
        path.push(package_name);
        path
    }

    /// Produce the next registry from the filesystem and the previous one.
    ///
    /// Known packages keep their counters. Entries that were not found this
    /// cycle are kept while their source folder still exists or once they
    /// are synced; unsynced entries whose folder is gone are dropped.
    pub fn discover(
        &self,
        destination_index: &DestinationIndex,
        previous: &Registry,
    ) -> Result<Registry> {
        debug!("Scanning source directory: {}", self.source_root.display());
        let folders = list_subdirectories(&self.source_root)
            .map_err(|e| Error::io_at(&self.source_root, e))?;

        let mut registry = Registry::new();

        for (folder_name, folder_path) in folders {
            let Some(parsed) = self.pattern.parse(&folder_name) else {
                warn!(
                    "Skipping folder '{}' as it does not match the expected format",
                    folder_name
                );
                continue;
            };

            let Some(project_root) = destination_index.get(parsed.project) else {
                debug!(
                    "No matching destination found for project '{}', skipping folder '{}'",
                    parsed.project, folder_name
                );
                continue;
            };

            let packages = match list_subdirectories(&folder_path) {
                Ok(packages) => packages,
                Err(e) => {
                    warn!("Failed to list packages in {}: {}", folder_path.display(), e);
                    continue;
                }
            };

            for (package_name, package_path) in packages {
                let key = normalize_path(&package_path);
                let destination =
                    self.destination_package_path(project_root, parsed.user, &package_name);

                let mut package = match previous.get(&key) {
                    Some(known) => {
                        let mut known = known.clone();
                        if !known.synced {
                            // Destination layout may have moved between polls.
                            known.destination_project_path = project_root.clone();
                            known.destination_package_path = destination;
                        }
                        known
                    }
                    None => {
                        info!(
                            "New package detected: {} (project: {}, user: {})",
                            package_path.display(),
                            parsed.project,
                            parsed.user
                        );
                        Package::new(
                            parsed.project,
                            parsed.user,
                            package_name,
                            package_path,
                            project_root.clone(),
                            destination,
                        )
                    }
                };

                self.track_stability(&mut package);
                registry.insert(key, package);
            }
        }

        self.carry_over_unseen(previous, &mut registry);
        Ok(registry)
    }

    /// Fingerprint the package if its budgets allow and update its counter
    fn track_stability(&self, package: &mut Package) {
        if !package.needs_fingerprint(self.stability_threshold, self.retry_limit) {
            return;
        }

        let current = match fingerprint(&package.source_path) {
            Ok(current) => current,
            Err(e) => {
                warn!(
                    "Failed to fingerprint {}, keeping previous state: {}",
                    package.source_path.display(),
                    e
                );
                return;
            }
        };

        match package.observe(current) {
            Observation::First => {
                debug!("Recorded first fingerprint for {}", package.source_path.display());
            }
            Observation::Unchanged => {
                debug!(
                    "Package '{}' stability check passed: {} of {}",
                    package.source_path.display(),
                    package.stable_count,
                    self.stability_threshold
                );
            }
            Observation::Changed => {
                info!(
                    "Package '{}' content changed, resetting stability checks",
                    package.source_path.display()
                );
            }
        }
    }

    fn carry_over_unseen(&self, previous: &Registry, registry: &mut Registry) {
        for (key, package) in previous {
            if registry.contains_key(key) {
                continue;
            }
            if package.synced || package.source_path.is_dir() {
                registry.insert(key.clone(), package.clone());
            } else {
                info!(
                    "Package {} no longer exists in source, dropping it",
                    package.source_path.display()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve_all;
    use ingestsync_config::NamingConvention;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        source: PathBuf,
        destination: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let source = temp.path().join("source");
            let destination = temp.path().join("destination");
            fs::create_dir_all(&source).unwrap();
            fs::create_dir_all(destination.join("acme")).unwrap();
            Self {
                _temp: temp,
                source,
                destination,
            }
        }

        fn write(&self, relative: &str, size: usize) {
            let path = self.source.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, vec![b'x'; size]).unwrap();
        }

        fn discoverer(&self, threshold: u32, retries: u32) -> PackageDiscoverer {
            PackageDiscoverer::new(
                &self.source,
                vec!["in".to_string(), "vendors".to_string()],
                FolderPattern::new(NamingConvention::Plain.pattern()).unwrap(),
                threshold,
                retries,
            )
        }

        fn index(&self) -> DestinationIndex {
            resolve_all(&[self.destination.clone()])
        }

        fn key(&self, relative: &str) -> String {
            normalize_path(&self.source.join(relative))
        }
    }

    #[test]
    fn test_registers_matching_packages() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        fixture.write("acme-alice/batch2/b.txt", 20);

        let registry = fixture
            .discoverer(2, 1)
            .discover(&fixture.index(), &Registry::new())
            .unwrap();

        assert_eq!(registry.len(), 2);
        let package = &registry[&fixture.key("acme-alice/batch1")];
        assert_eq!(package.project_name, "acme");
        assert_eq!(package.user_name, "alice");
        assert_eq!(package.stable_count, 0);
        assert!(package.fingerprint.is_some());
        assert_eq!(
            package.destination_package_path,
            fixture.destination.join("acme/in/vendors/alice/batch1")
        );
    }

    #[test]
    fn test_skips_unmatched_and_unknown_projects() {
        let fixture = Fixture::new();
        fixture.write("acme-alice-extra/batch1/a.txt", 10);
        fixture.write("zorp-bob/batch1/a.txt", 10);
        fixture.write("loose-file.txt", 1);

        let registry = fixture
            .discoverer(2, 1)
            .discover(&fixture.index(), &Registry::new())
            .unwrap();

        assert!(registry.is_empty());
    }

    #[test]
    fn test_stable_count_climbs_then_stops() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        let discoverer = fixture.discoverer(2, 1);
        let index = fixture.index();
        let key = fixture.key("acme-alice/batch1");

        let mut registry = Registry::new();
        let mut counts = Vec::new();
        for _ in 0..6 {
            registry = discoverer.discover(&index, &registry).unwrap();
            counts.push(registry[&key].stable_count);
        }

        // Fingerprinting stops once the count is past the threshold.
        assert_eq!(counts, [0, 1, 2, 3, 3, 3]);
    }

    #[test]
    fn test_change_resets_stable_count() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        fixture.write("acme-alice/batch1/b.txt", 20);
        let discoverer = fixture.discoverer(2, 1);
        let index = fixture.index();
        let key = fixture.key("acme-alice/batch1");

        let registry = discoverer.discover(&index, &Registry::new()).unwrap();
        let registry = discoverer.discover(&index, &registry).unwrap();
        assert_eq!(registry[&key].stable_count, 1);

        fixture.write("acme-alice/batch1/b.txt", 25);
        let registry = discoverer.discover(&index, &registry).unwrap();
        assert_eq!(registry[&key].stable_count, 0);
    }

    #[test]
    fn test_synced_package_is_not_fingerprinted() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        let discoverer = fixture.discoverer(2, 1);
        let index = fixture.index();
        let key = fixture.key("acme-alice/batch1");

        let mut registry = discoverer.discover(&index, &Registry::new()).unwrap();
        let package = registry.get_mut(&key).unwrap();
        package.mark_synced(chrono::Utc::now());
        let before = package.clone();

        fixture.write("acme-alice/batch1/late.txt", 5);
        let registry = discoverer.discover(&index, &registry).unwrap();

        assert_eq!(registry[&key], before);
    }

    #[test]
    fn test_exhausted_retries_freeze_fingerprint() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        let discoverer = fixture.discoverer(2, 1);
        let index = fixture.index();
        let key = fixture.key("acme-alice/batch1");

        let mut registry = discoverer.discover(&index, &Registry::new()).unwrap();
        registry.get_mut(&key).unwrap().copy_retry_count = 2;
        let before = registry[&key].clone();

        fixture.write("acme-alice/batch1/b.txt", 10);
        let registry = discoverer.discover(&index, &registry).unwrap();
        assert_eq!(registry[&key], before);
    }

    #[test]
    fn test_vanished_packages_are_pruned_unless_synced() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/pending/a.txt", 10);
        fixture.write("acme-alice/done/a.txt", 10);
        let discoverer = fixture.discoverer(2, 1);
        let index = fixture.index();

        let mut registry = discoverer.discover(&index, &Registry::new()).unwrap();
        registry
            .get_mut(&fixture.key("acme-alice/done"))
            .unwrap()
            .mark_synced(chrono::Utc::now());

        fs::remove_dir_all(fixture.source.join("acme-alice")).unwrap();
        let registry = discoverer.discover(&index, &registry).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains_key(&fixture.key("acme-alice/done")));
    }

    #[test]
    fn test_package_kept_while_destination_is_missing() {
        let fixture = Fixture::new();
        fixture.write("acme-alice/batch1/a.txt", 10);
        let discoverer = fixture.discoverer(2, 1);
        let key = fixture.key("acme-alice/batch1");

        let registry = discoverer.discover(&fixture.index(), &Registry::new()).unwrap();
        let registry = discoverer.discover(&fixture.index(), &registry).unwrap();
        assert_eq!(registry[&key].stable_count, 1);

        let registry = discoverer
            .discover(&DestinationIndex::new(), &registry)
            .unwrap();
        assert_eq!(registry[&key].stable_count, 1);
    }

    #[test]
    fn test_missing_source_root_is_an_error() {
        let fixture = Fixture::new();
        fs::remove_dir_all(&fixture.source).unwrap();

        let result = fixture
            .discoverer(2, 1)
            .discover(&fixture.index(), &Registry::new());
        assert!(result.is_err());
    }
}
