//! binmirror - binary mirror synchronization for a private package registry.
//!
//! Mirrors structurally different upstream binary sites (object-storage
//! buckets, GitHub releases, npm manifests with node-pre-gyp binaries, HTML
//! directory indexes, Playwright's browser CDN) into one virtual directory
//! tree per category, stored in a SQL database, with file bytes kept in a
//! [`storage::BlobStore`].
//!
//! # Features
//!
//! - `sqlite` / `postgres` - Database backends.
//! - `migrate` - Enables database migration support. When enabled, you can use
//!   [`connect_and_migrate`] to automatically run migrations on connection.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use binmirror::{connect_and_migrate, builtin_categories, repository};
//! use binmirror::http::reqwest_transport::ReqwestTransport;
//! use binmirror::source::{AdapterRegistry, RegistryOptions, SourceClient};
//! use binmirror::storage::FsBlobStore;
//! use binmirror::sync::{SyncContext, SyncOptions, sync_category};
//!
//! let db = connect_and_migrate("sqlite://binmirror.db?mode=rwc").await?;
//! let transport = Arc::new(ReqwestTransport::with_timeout(Duration::from_secs(30))?);
//! let registry = AdapterRegistry::new(builtin_categories(), transport.clone(), &RegistryOptions::default())?;
//!
//! let ctx = SyncContext {
//!     db: &db,
//!     store: Arc::new(FsBlobStore::new("/var/lib/binmirror")),
//!     downloader: SourceClient::new(transport),
//!     options: SyncOptions::default(),
//! };
//! let report = sync_category(&ctx, registry.get("node").unwrap(), None, None).await?;
//!
//! for node in repository::list(&db, "node", "/").await? {
//!     println!("{}", node.full_path());
//! }
//! ```

pub mod category;
pub mod db;
pub mod entity;
pub mod http;
pub mod repository;
pub mod retry;
pub mod source;
pub mod storage;
pub mod sync;
pub mod task;

#[cfg(feature = "migrate")]
pub mod migration;

pub use category::{AdapterKind, CategoryConfig, ConfigError, builtin_categories};
pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use repository::RepositoryError;
pub use source::{AdapterRegistry, BinaryAdapter, BinaryItem, CategoryEntry, ResumeHint};
pub use storage::{BlobStore, FsBlobStore, MemoryBlobStore, blob_key};
pub use sync::{SyncError, SyncOptions, SyncReport};
pub use task::{DbTaskEngine, TaskEngine, TaskError};
