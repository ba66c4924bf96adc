//! Polling directory synchronization for ingestsync
//!
//! This crate watches a source directory for `<project>-<user>` folders and
//! copies each package inside them into the matching project of a
//! destination base once its contents stop changing:
//!
//! - **Discovery**: Match folder names, resolve destination projects and track packages
//! - **Stability**: Fingerprint each package and count unchanged cycles
//! - **Copy**: Incremental copy that skips files already present with the same size
//! - **Verification**: Compare the destination fingerprint with the source before marking a package synced
//! - **Persistence**: Atomic JSON state file so counters survive restarts
//!
//! # Examples
//!
//! ```rust,no_run
//! use ingestsync_sync::{MonitorSettings, SyncEngine};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = MonitorSettings {
//!     source_root: "/data/incoming".into(),
//!     destination_bases: vec!["/mnt/projects".into()],
//!     check_interval: Duration::from_secs(10),
//!     stability_threshold: 3,
//!     retry_limit: 2,
//!     ingest_prefix: vec!["in".to_string(), "vendors".to_string()],
//!     folder_pattern: r"^(?P<project>[^-]+)-(?P<user>[^-]+)$".to_string(),
//!     state_file: "/data/incoming/folder_states.json".into(),
//! };
//! let mut engine = SyncEngine::new(settings).await?;
//! let report = engine.run_cycle().await?;
//! println!("{} packages tracked, {} synced", report.tracked, report.synced);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod copy;
pub mod discovery;
pub mod engine;
pub mod fingerprint;
pub mod naming;
pub mod resolver;
pub mod state;

pub use copy::{copy_package, CopyOutcome};
pub use discovery::PackageDiscoverer;
pub use engine::{CycleReport, MonitorSettings, SyncEngine};
pub use fingerprint::{fingerprint, scan_entries, EntrySet, FileEntry};
pub use naming::{FolderPattern, ProjectUser};
pub use resolver::resolve_all;
pub use state::StateStore;
