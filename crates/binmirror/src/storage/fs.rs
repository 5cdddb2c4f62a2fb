//! Filesystem blob store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use super::{BlobError, BlobStore, key_segments};

/// Stores each blob as a file below `root`.
///
/// Writes go to a sibling temporary file first and are renamed into place, so
/// readers never observe a partial blob.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        let mut path = self.root.clone();
        for segment in key_segments(key)? {
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::io(key, e))?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(format!(".tmp-{}", Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp);

        if let Err(e) = fs::write(&tmp, &bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(BlobError::io(key, e));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(BlobError::io(key, e));
        }

        tracing::debug!(key, size = bytes.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(BlobError::io(key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::io(key, e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.path_for(key)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| BlobError::io(key, e))
    }
}
