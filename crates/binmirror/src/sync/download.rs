//! Blob fetching and the re-download decision.

use std::sync::Arc;

use crate::entity::binary::Model as BinaryNode;
use crate::http::HttpRequest;
use crate::source::{BinaryItem, SourceClient, SourceError};
use crate::storage::{BlobStore, blob_key};

/// Result of fetching one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Bytes were stored under the node's blob key.
    Stored { bytes: u64 },
    /// Upstream answered with one of the item's ignored statuses.
    ExpectedMissing { status: u16 },
    /// Anything else; left for the next run.
    Failed { message: String },
}

/// One file scheduled for download.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub parent: String,
    pub item: BinaryItem,
    /// The stored node was flagged missing before this run.
    pub was_missing: bool,
}

impl DownloadJob {
    pub fn path(&self) -> String {
        format!("{}{}", self.parent, self.item.name)
    }
}

/// Whether listing metadata is unchanged since the stored node.
pub fn is_unchanged(existing: &BinaryNode, item: &BinaryItem) -> bool {
    existing.size == item.size && existing.date == item.date
}

/// Decide whether `item` must be fetched.
///
/// A file is skipped when its size and date are unchanged and it is either
/// known to be missing upstream or already present in the store.
pub async fn needs_download(
    store: &dyn BlobStore,
    category: &str,
    parent: &str,
    existing: Option<&BinaryNode>,
    item: &BinaryItem,
) -> bool {
    let Some(existing) = existing else {
        return true;
    };
    if !is_unchanged(existing, item) {
        return true;
    }
    if existing.missing {
        return false;
    }
    let key = blob_key(category, parent, &item.name);
    match store.exists(&key).await {
        Ok(present) => !present,
        Err(e) => {
            tracing::warn!(key, error = %e, "Blob existence check failed");
            true
        }
    }
}

/// Fetch `job` from upstream and store it.
///
/// The whole response body is held in memory until the store accepts it, so
/// peak memory is about `download_concurrency` times the largest file.
pub async fn fetch_blob(
    client: &SourceClient,
    store: Arc<dyn BlobStore>,
    category: &str,
    job: &DownloadJob,
) -> DownloadOutcome {
    let item = &job.item;
    if item.source_url.is_empty() {
        return DownloadOutcome::Failed {
            message: "no source url".to_string(),
        };
    }

    let response = match client.send_ok(HttpRequest::get(&item.source_url)).await {
        Ok(response) => response,
        Err(SourceError::Status { status, .. })
            if item.ignore_download_statuses.contains(&status) =>
        {
            return DownloadOutcome::ExpectedMissing { status };
        }
        Err(e) => {
            return DownloadOutcome::Failed {
                message: e.to_string(),
            };
        }
    };

    let bytes = response.body.len() as u64;
    let key = blob_key(category, &job.parent, &item.name);
    match store.put(&key, response.body).await {
        Ok(()) => DownloadOutcome::Stored { bytes },
        Err(e) => DownloadOutcome::Failed {
            message: e.to_string(),
        },
    }
}
