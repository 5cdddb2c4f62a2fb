//! Durable byte storage for mirrored files.
//!
//! Blobs are addressed by a `/`-delimited key derived from the node address
//! (see [`blob_key`]); backends map that key onto their own namespace.

use async_trait::async_trait;
use thiserror::Error;

pub mod fs;
pub mod memory;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

/// Key prefix shared by every mirrored file.
pub const BLOB_PREFIX: &str = "/binaries/";

/// Storage key of the node `(category, parent, name)`.
pub fn blob_key(category: &str, parent: &str, name: &str) -> String {
    format!("/binaries/{category}{parent}{name}")
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob I/O error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl BlobError {
    pub(crate) fn io(key: &str, source: std::io::Error) -> Self {
        Self::Io {
            key: key.to_string(),
            source,
        }
    }
}

/// Split a key into its path segments, rejecting anything that could escape
/// the store root.
pub fn key_segments(key: &str) -> Result<Vec<&str>, BlobError> {
    let invalid = |reason| BlobError::InvalidKey {
        key: key.to_string(),
        reason,
    };
    let rest = key
        .strip_prefix('/')
        .ok_or_else(|| invalid("must start with '/'"))?;
    if rest.is_empty() || rest.ends_with('/') {
        return Err(invalid("must name a file"));
    }
    let segments: Vec<&str> = rest.split('/').collect();
    for segment in &segments {
        match *segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("relative path segment")),
            s if s.contains('\\') || s.contains('\0') => {
                return Err(invalid("forbidden character"));
            }
            _ => {}
        }
    }
    Ok(segments)
}

/// Byte storage backend.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous content.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Remove `key`; removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobError>;
}
