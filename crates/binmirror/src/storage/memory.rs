//! In-memory blob store for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BlobError, BlobStore, key_segments};

#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        key_segments(key)?;
        self.blobs.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        key_segments(key)?;
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        key_segments(key)?;
        self.blobs.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        key_segments(key)?;
        Ok(self.blobs.read().await.contains_key(key))
    }
}
