//! Incremental package copy

use crate::fingerprint::{relative_key, walk_error, EntrySet, FileEntry};
use ingestsync_types::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// What a single copy pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Files written to the destination
    pub files_copied: u64,
    /// Files already present with the same name and size
    pub files_skipped: u64,
    /// Bytes written to the destination
    pub bytes_copied: u64,
}

impl CopyOutcome {
    /// Whether at least one file was copied
    pub fn copied(&self) -> bool {
        self.files_copied > 0
    }
}

/// Copy every file of `source_dir` that is missing from `known_destination`.
///
/// A file counts as present when the same (relative path, size) pair is in
/// `known_destination`. Missing directories are created, permissions are
/// copied with the file and the modification time is carried over. Calling
/// this again with an unchanged source and the refreshed destination set
/// copies nothing.
pub fn copy_package(
    source_dir: &Path,
    destination_dir: &Path,
    known_destination: &EntrySet,
) -> Result<CopyOutcome> {
    let mut outcome = CopyOutcome::default();

    for entry in WalkDir::new(source_dir).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(source_dir, e))?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .unwrap_or(entry.path());
        let target = destination_dir.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io_at(&target, e))?;
            continue;
        }
        if !entry.file_type().is_file() {
            debug!("Skipping non-regular file: {}", entry.path().display());
            continue;
        }

        let metadata = entry.metadata().map_err(|e| walk_error(source_dir, e))?;
        let key = FileEntry::new(relative_key(relative), metadata.len());
        if known_destination.contains(&key) {
            outcome.files_skipped += 1;
            continue;
        }

        copy_file(entry.path(), &target, &metadata)?;
        outcome.files_copied += 1;
        outcome.bytes_copied += metadata.len();
    }

    debug!(
        "Copy pass {} -> {}: {} copied, {} skipped, {} bytes",
        source_dir.display(),
        destination_dir.display(),
        outcome.files_copied,
        outcome.files_skipped,
        outcome.bytes_copied
    );
    Ok(outcome)
}

fn copy_file(source: &Path, destination: &Path, metadata: &fs::Metadata) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
    }

    // std::fs::copy carries the permission bits over.
    fs::copy(source, destination).map_err(|e| Error::io_at(source, e))?;

    let modified = filetime::FileTime::from_last_modification_time(metadata);
    filetime::set_file_mtime(destination, modified).map_err(|e| Error::io_at(destination, e))?;

    debug!("Copied file: {} -> {}", source.display(), destination.display());
    Ok(())
}
