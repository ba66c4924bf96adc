//! Registry persistence

use ingestsync_types::{Error, Package, Registry, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// JSON state file holding the package registry
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Create a store backed by `path`
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry.
    ///
    /// A missing file is a first run and yields an empty registry. A file that
    /// cannot be parsed is reported and also yields an empty registry; it is
    /// replaced on the next save.
    pub async fn load(&self) -> Result<Registry> {
        if !self.path.exists() {
            debug!(
                "State file {} does not exist, starting with empty registry",
                self.path.display()
            );
            return Ok(Registry::new());
        }

        let data = fs::read(&self.path).await.map_err(|e| {
            Error::state(format!(
                "Failed to read state file '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        let stored: BTreeMap<String, Package> = match serde_json::from_slice(&data) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(
                    "Failed to load folder states from {}: {}",
                    self.path.display(),
                    e
                );
                return Ok(Registry::new());
            }
        };

        // Re-key on load so entries written by older builds normalize the same way.
        let registry: Registry = stored
            .into_values()
            .map(|package| (package.key(), package))
            .collect();

        info!(
            "Loaded folder states: {} packages from previous session",
            registry.len()
        );
        Ok(registry)
    }

    /// Persist the registry atomically
    pub async fn save(&self, registry: &Registry) -> Result<()> {
        let data = serde_json::to_vec_pretty(registry)
            .map_err(|e| Error::state(format!("Failed to serialize folder states: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state(format!(
                        "Failed to create state directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let temp_path = self.temp_path();
        let write_result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &self.path).await
        }
        .await;

        if let Err(e) = write_result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::state(format!(
                "Failed to save folder states to '{}': {}",
                self.path.display(),
                e
            )));
        }

        debug!(
            "Saved {} packages to {}",
            registry.len(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}
