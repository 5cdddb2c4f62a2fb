//! Category synchronization.
//!
//! # Module Structure
//!
//! - [`types`] - `SyncOptions`, `SyncReport`, constants
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`download`] - Blob fetching and the re-download decision
//! - [`engine`] - The breadth-first walk: `sync_category()`
//!
//! # Example
//!
//! ```ignore
//! use binmirror::sync::{SyncContext, SyncOptions, sync_category};
//!
//! let ctx = SyncContext { db: &db, store, downloader, options: SyncOptions::default() };
//! let entry = registry.get("node").expect("configured");
//! let report = sync_category(&ctx, entry, None, None).await?;
//! println!("{}", report.summary());
//! ```

pub mod download;
pub mod engine;
mod progress;
mod types;

pub use types::{SyncOptions, SyncReport};

pub use types::{
    DEFAULT_DOWNLOAD_CONCURRENCY, DEFAULT_MAX_DEPTH, DEFAULT_MAX_DIRS, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
    MAX_RETRIES,
};

pub use progress::{ProgressCallback, SyncProgress, emit};

pub use download::DownloadOutcome;
pub use engine::{SyncContext, SyncError, sync_category};
