//! Folder fingerprints built from file names and sizes

use ingestsync_types::{Error, Fingerprint, Result};
use std::collections::BTreeSet;
use std::path::{Component, Path};
use tracing::debug;
use walkdir::WalkDir;

/// One regular file inside a scanned tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileEntry {
    /// Path relative to the scanned root, `/`-separated
    pub relative_path: String,
    /// Size in bytes
    pub size: u64,
}

impl FileEntry {
    /// Create a new entry
    pub fn new(relative_path: impl Into<String>, size: u64) -> Self {
        Self {
            relative_path: relative_path.into(),
            size,
        }
    }
}

/// Order-independent set of file entries
pub type EntrySet = BTreeSet<FileEntry>;

/// Collect the (relative path, size) pairs of every regular file under `root`.
///
/// A missing `root` yields an empty set, which is what the copy engine wants
/// for a destination that has not been created yet.
pub fn scan_entries(root: &Path) -> Result<EntrySet> {
    let mut entries = EntrySet::new();
    if !root.exists() {
        return Ok(entries);
    }

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry.metadata().map_err(|e| walk_error(root, e))?;
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        entries.insert(FileEntry::new(relative_key(relative), metadata.len()));
    }

    Ok(entries)
}

/// Fingerprint the tree rooted at `root`
pub fn fingerprint(root: &Path) -> Result<Fingerprint> {
    if !root.is_dir() {
        return Err(Error::FileNotFound {
            path: root.to_path_buf(),
        });
    }

    let entries = scan_entries(root)?;
    let fingerprint = fingerprint_entries(&entries);
    debug!(
        "Fingerprinted {} files in '{}': {}",
        entries.len(),
        root.display(),
        fingerprint
    );
    Ok(fingerprint)
}

/// Reduce an entry set to a fingerprint.
///
/// Entries are hashed in sorted order over a fixed byte layout, so the value
/// is the same across runs and can be persisted.
pub fn fingerprint_entries(entries: &EntrySet) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    for entry in entries {
        hasher.update(entry.relative_path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&entry.size.to_le_bytes());
    }
    Fingerprint::from_hex(hasher.finalize().to_hex().to_string())
}

/// Relative path with `/` separators regardless of platform
pub(crate) fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn walk_error(root: &Path, error: walkdir::Error) -> Error {
    let path = error.path().unwrap_or(root).to_path_buf();
    match error.into_io_error() {
        Some(io) => Error::io_at(path, io),
        None => Error::sync(format!("Filesystem loop detected at '{}'", path.display())),
    }
}
