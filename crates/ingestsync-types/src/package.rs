//! Package data model and lifecycle transitions
//!
//! A package is one leaf folder under a `<project>-<user>` directory in the
//! source tree. Its lifecycle is derived from three counters:
//!
//! ```text
//! New ──▶ Stabilizing ──▶ Stable ──▶ Synced
//!  ▲           │             │
//!  └─ changed ─┘             └──▶ Stuck (retry budget exhausted)
//! ```
//!
//! All counter mutations go through the methods on [`Package`] so the
//! invariants hold no matter which component drives them.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Registry key: the package's source path in normalized form
pub type PackageKey = String;

/// All tracked packages, keyed by normalized source path
pub type Registry = BTreeMap<PackageKey, Package>;

/// Project name to destination project root
pub type DestinationIndex = BTreeMap<String, PathBuf>;

/// Opaque digest of a folder's (relative path, size) pairs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed hex digest
    pub fn from_hex<S: Into<String>>(hex: S) -> Self {
        Self(hex.into())
    }

    /// Hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is plenty for log lines.
        let short = self.0.get(..12).unwrap_or(&self.0);
        f.write_str(short)
    }
}

/// Derived lifecycle state of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PackageState {
    /// Just detected or content changed since the last cycle
    New,
    /// Unchanged for at least one cycle, not yet past the threshold
    Stabilizing,
    /// Past the threshold and eligible for a copy attempt
    Stable,
    /// Past the threshold but out of copy retries
    Stuck,
    /// Copied and verified; terminal
    Synced,
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Stabilizing => "stabilizing",
            Self::Stable => "stable",
            Self::Stuck => "stuck",
            Self::Synced => "synced",
        };
        f.write_str(name)
    }
}

/// Result of feeding a fresh fingerprint into a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// No fingerprint was stored before
    First,
    /// Same as the stored fingerprint; stability count went up
    Unchanged,
    /// Differs from the stored fingerprint; stability count was reset
    Changed,
}

/// A tracked package and its synchronization progress
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Package {
    /// Project name parsed from the project-user folder
    pub project_name: String,
    /// User name parsed from the project-user folder
    pub user_name: String,
    /// Name of the package folder itself
    pub package_name: String,
    /// Absolute source path of the package
    pub source_path: PathBuf,
    /// Destination project root the package resolved to
    pub destination_project_path: PathBuf,
    /// Final destination of the package contents
    pub destination_package_path: PathBuf,
    /// Last observed source fingerprint
    pub fingerprint: Option<Fingerprint>,
    /// Consecutive cycles with an unchanged fingerprint
    pub stable_count: u32,
    /// Whether the package has been copied and verified
    pub synced: bool,
    /// Failed copy attempts so far
    pub copy_retry_count: u32,
    /// When the package was first seen
    pub detected_at: DateTime<Utc>,
    /// When the copy was verified
    pub copied_at: Option<DateTime<Utc>>,
}

impl Package {
    /// Create a freshly detected package
    pub fn new(
        project_name: impl Into<String>,
        user_name: impl Into<String>,
        package_name: impl Into<String>,
        source_path: PathBuf,
        destination_project_path: PathBuf,
        destination_package_path: PathBuf,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            user_name: user_name.into(),
            package_name: package_name.into(),
            source_path,
            destination_project_path,
            destination_package_path,
            fingerprint: None,
            stable_count: 0,
            synced: false,
            copy_retry_count: 0,
            detected_at: Utc::now(),
            copied_at: None,
        }
    }

    /// Registry key for this package
    pub fn key(&self) -> PackageKey {
        normalize_path(&self.source_path)
    }

    /// Derive the lifecycle state for the given budgets
    pub fn state(&self, stability_threshold: u32, retry_limit: u32) -> PackageState {
        if self.synced {
            PackageState::Synced
        } else if self.stable_count > stability_threshold {
            if self.copy_retry_count < retry_limit {
                PackageState::Stable
            } else {
                PackageState::Stuck
            }
        } else if self.stable_count == 0 {
            PackageState::New
        } else {
            PackageState::Stabilizing
        }
    }

    /// Whether discovery should fingerprint this package this cycle
    pub fn needs_fingerprint(&self, stability_threshold: u32, retry_limit: u32) -> bool {
        !self.synced
            && self.stable_count <= stability_threshold
            && self.copy_retry_count <= retry_limit
    }

    /// Whether the engine may attempt a copy this cycle
    pub fn is_copy_eligible(&self, stability_threshold: u32, retry_limit: u32) -> bool {
        self.state(stability_threshold, retry_limit) == PackageState::Stable
    }

    /// Feed a freshly computed source fingerprint into the stability counter
    pub fn observe(&mut self, fingerprint: Fingerprint) -> Observation {
        match &self.fingerprint {
            Some(previous) if *previous == fingerprint => {
                self.stable_count += 1;
                Observation::Unchanged
            }
            Some(_) => {
                self.stable_count = 0;
                self.fingerprint = Some(fingerprint);
                Observation::Changed
            }
            None => {
                self.stable_count = 0;
                self.fingerprint = Some(fingerprint);
                Observation::First
            }
        }
    }

    /// Record a failed copy attempt
    pub fn record_copy_failure(&mut self) {
        if !self.synced {
            self.copy_retry_count += 1;
        }
    }

    /// Mark the package as copied and verified
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        if !self.synced {
            self.synced = true;
            self.copied_at = Some(at);
        }
    }
}

/// Normalize a path into its registry key form.
///
/// Backslashes become `/`, repeated separators collapse and a trailing
/// separator is dropped, so keys built on different platforms or through
/// different join calls compare equal.
pub fn normalize_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut normalized = String::with_capacity(raw.len());
    let mut previous_was_separator = false;

    for ch in raw.chars() {
        let is_separator = ch == '/';
        if is_separator && previous_was_separator {
            continue;
        }
        previous_was_separator = is_separator;
        normalized.push(ch);
    }

    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn package() -> Package {
        Package::new(
            "acme",
            "alice",
            "batch1",
            PathBuf::from("/src/acme-alice/batch1"),
            PathBuf::from("/dst/acme"),
            PathBuf::from("/dst/acme/in/vendors/alice/batch1"),
        )
    }

    #[test]
    fn test_new_package_defaults() {
        let package = package();
        assert_eq!(package.stable_count, 0);
        assert!(!package.synced);
        assert_eq!(package.copy_retry_count, 0);
        assert!(package.fingerprint.is_none());
        assert!(package.copied_at.is_none());
        assert_eq!(package.key(), "/src/acme-alice/batch1");
    }

    #[test]
    fn test_observe_counts_and_resets() {
        let mut package = package();
        let a = Fingerprint::from_hex("aaaa");
        let b = Fingerprint::from_hex("bbbb");

        assert_eq!(package.observe(a.clone()), Observation::First);
        assert_eq!(package.stable_count, 0);
        assert_eq!(package.observe(a.clone()), Observation::Unchanged);
        assert_eq!(package.observe(a), Observation::Unchanged);
        assert_eq!(package.stable_count, 2);

        assert_eq!(package.observe(b.clone()), Observation::Changed);
        assert_eq!(package.stable_count, 0);
        assert_eq!(package.fingerprint, Some(b));
    }

    #[rstest]
    #[case(0, 0, false, PackageState::New)]
    #[case(1, 0, false, PackageState::Stabilizing)]
    #[case(2, 0, false, PackageState::Stabilizing)]
    #[case(3, 0, false, PackageState::Stable)]
    #[case(3, 1, false, PackageState::Stable)]
    #[case(3, 2, false, PackageState::Stuck)]
    #[case(3, 2, true, PackageState::Synced)]
    fn test_state_derivation(
        #[case] stable_count: u32,
        #[case] retries: u32,
        #[case] synced: bool,
        #[case] expected: PackageState,
    ) {
        let mut package = package();
        package.stable_count = stable_count;
        package.copy_retry_count = retries;
        package.synced = synced;

        assert_eq!(package.state(2, 2), expected);
    }

    #[test]
    fn test_fingerprint_budget_gate() {
        let mut package = package();
        package.stable_count = 2;
        assert!(package.needs_fingerprint(2, 2));

        package.stable_count = 3;
        assert!(!package.needs_fingerprint(2, 2));

        package.stable_count = 0;
        package.copy_retry_count = 3;
        assert!(!package.needs_fingerprint(2, 2));

        package.copy_retry_count = 0;
        package.synced = true;
        assert!(!package.needs_fingerprint(2, 2));
    }

    #[test]
    fn test_synced_is_terminal() {
        let mut package = package();
        let first = Utc::now();
        package.mark_synced(first);
        package.mark_synced(first + chrono::Duration::seconds(30));
        package.record_copy_failure();

        assert!(package.synced);
        assert_eq!(package.copied_at, Some(first));
        assert_eq!(package.copy_retry_count, 0);
    }

    #[rstest]
    #[case("/src/acme-alice/batch1", "/src/acme-alice/batch1")]
    #[case("/src//acme-alice/batch1/", "/src/acme-alice/batch1")]
    #[case("C:\\src\\acme-alice\\batch1", "C:/src/acme-alice/batch1")]
    #[case("/", "/")]
    fn test_normalize_path(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_path(Path::new(input)), expected);
    }

    #[test]
    fn test_fingerprint_display_is_short() {
        let fingerprint = Fingerprint::from_hex("0123456789abcdef0123");
        assert_eq!(fingerprint.to_string(), "0123456789ab");
        assert_eq!(Fingerprint::from_hex("abc").to_string(), "abc");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_package_json_shape() {
        let mut package = package();
        package.observe(Fingerprint::from_hex("feed"));
        let value = serde_json::to_value(&package).unwrap();

        assert_eq!(value["fingerprint"], "feed");
        assert_eq!(value["stable_count"], 0);
        assert_eq!(value["synced"], false);
        assert!(value["copied_at"].is_null());
    }
}
