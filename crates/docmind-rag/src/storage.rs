//! Upload persistence

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use docmind_core::{DocmindError, DocumentStorage, Result, StorageConfig};
use tracing::info;

/// Writes uploads into a local directory
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    /// Store files under `root`, created on first save
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create from config
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.upload_dir.clone())
    }

    /// Upload directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Final path component of a client-supplied name
fn sanitize_file_name(file_name: &str) -> Option<&str> {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

#[async_trait]
impl DocumentStorage for LocalFileStorage {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = sanitize_file_name(file_name).ok_or_else(|| {
            DocmindError::StorageError(format!("Invalid file name: {file_name:?}"))
        })?;

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            DocmindError::StorageError(format!(
                "Failed to create {}: {e}",
                self.root.display()
            ))
        })?;

        let path = self.root.join(name);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            DocmindError::StorageError(format!("Failed to write {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), bytes = bytes.len(), "upload stored");
        Ok(path)
    }
}
