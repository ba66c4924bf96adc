//! Destination project lookup

use ingestsync_types::DestinationIndex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Build the project index from the destination bases.
///
/// Every immediate subdirectory of an existing base is a candidate project.
/// Bases are applied in order, so when two bases hold the same project the
/// later one wins. Missing or unreadable bases are skipped.
pub fn resolve_all(destination_bases: &[PathBuf]) -> DestinationIndex {
    let mut index = DestinationIndex::new();

    for base in destination_bases {
        if !base.is_dir() {
            warn!("Destination base path does not exist: {}", base.display());
            continue;
        }

        match list_subdirectories(base) {
            Ok(projects) => {
                debug!(
                    "Found {} projects in destination base {}",
                    projects.len(),
                    base.display()
                );
                for (name, path) in projects {
                    if let Some(previous) = index.insert(name.clone(), path) {
                        debug!(
                            "Project '{}' in {} overrides {}",
                            name,
                            base.display(),
                            previous.display()
                        );
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Failed to list destination base {}: {}",
                    base.display(),
                    e
                );
            }
        }
    }

    index
}

/// Immediate subdirectories of `dir` as (name, path) pairs, sorted by name
pub(crate) fn list_subdirectories(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut subdirectories = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        // Follows symlinks, so a linked project folder still counts.
        if !path.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!("Skipping non UTF-8 folder name in {}", dir.display());
            continue;
        };
        subdirectories.push((name, path));
    }
    subdirectories.sort();
    Ok(subdirectories)
}
