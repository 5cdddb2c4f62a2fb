//! Configuration file support for binmirror.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `BINMIRROR_`, nested keys joined
//!    with `__`, e.g. `BINMIRROR_DATABASE__URL`)
//! 3. Config file (`./binmirror.toml`, then `~/.config/binmirror/config.toml`)
//! 4. Built-in defaults
//!
//! The database defaults to `sqlite://~/.local/state/binmirror/binmirror.db`
//! and blobs to `~/.local/share/binmirror/blobs` on Linux.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "postgres://localhost/binmirror"
//!
//! [storage]
//! root = "/srv/binmirror/blobs"
//!
//! [sync]
//! workers = 4
//! download_concurrency = 8
//! max_dirs = 50000
//! max_depth = 32
//! run_timeout_hours = 6
//!
//! [github]
//! token = "ghp_..."  # or GITHUB_TOKEN / BINMIRROR_GITHUB__TOKEN
//!
//! # Overrides or extends the builtin catalogue.
//! [categories.sharp-libvips]
//! adapter = "github"
//! base_url = "https://api.github.com"
//! repo = "lovell/sharp-libvips"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use binmirror::retry::RetryConfig;
use binmirror::source::RegistryOptions;
use binmirror::sync::{DEFAULT_DOWNLOAD_CONCURRENCY, DEFAULT_MAX_DEPTH, DEFAULT_MAX_DIRS};
use binmirror::task::WorkerConfig;
use binmirror::{CategoryConfig, SyncOptions, builtin_categories};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub github: GitHubConfig,
    /// Category definitions layered over the builtin catalogue.
    pub categories: BTreeMap<String, CategoryConfig>,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL; `sqlite://` and `postgres://` are supported.
    pub url: Option<String>,
}

/// Blob storage configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the filesystem blob store.
    pub root: Option<PathBuf>,
}

/// Sync and worker tuning.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Categories synced concurrently by a worker.
    pub workers: usize,
    /// Concurrent blob downloads within one category. Bodies are buffered
    /// whole, so peak memory grows with `workers * download_concurrency`.
    pub download_concurrency: usize,
    /// Directory bound of one run.
    pub max_dirs: usize,
    /// Deepest directory level a run descends into.
    pub max_depth: usize,
    pub run_timeout_hours: i64,
    /// Seconds between polls of an empty queue.
    pub poll_interval_secs: u64,
    /// Per-request upstream timeout.
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: binmirror::task::worker::DEFAULT_WORKER_CONCURRENCY,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            max_dirs: DEFAULT_MAX_DIRS,
            max_depth: DEFAULT_MAX_DEPTH,
            run_timeout_hours: 6,
            poll_interval_secs: 5,
            request_timeout_secs: 60,
        }
    }
}

/// GitHub API configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: Option<String>,
    /// Request pacing; 5/s with a token and 1/s without when unset.
    pub requests_per_second: Option<u32>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. XDG config file (`~/.config/binmirror/config.toml`)
    /// 2. Local config file (`./binmirror.toml`)
    /// 3. Environment variables with the `BINMIRROR_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("binmirror.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./binmirror.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("BINMIRROR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// The database URL, falling back to the default state directory.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("binmirror.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// Root of the blob store, falling back to the default data directory.
    pub fn blob_root(&self) -> Option<PathBuf> {
        self.storage
            .root
            .clone()
            .or_else(|| Self::default_data_dir().map(|dir| dir.join("blobs")))
    }

    /// GitHub token from the config, or the conventional `GITHUB_TOKEN`.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.is_empty())
    }

    /// Builtin categories with configured entries replacing or adding to them.
    pub fn categories(&self) -> BTreeMap<String, CategoryConfig> {
        let mut categories = builtin_categories();
        for (name, category) in &self.categories {
            categories.insert(name.clone(), category.clone());
        }
        categories
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            github_token: self.github_token(),
            github_rps: self.github.requests_per_second,
            retry: RetryConfig::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.request_timeout_secs.max(1))
    }

    pub fn sync_options(&self, dry_run: bool) -> SyncOptions {
        SyncOptions {
            dry_run,
            download_concurrency: self.sync.download_concurrency.max(1),
            max_dirs: self.sync.max_dirs.max(1),
            max_depth: self.sync.max_depth.max(1),
            ..SyncOptions::default()
        }
    }

    /// Worker settings; `concurrency` overrides `[sync] workers`.
    pub fn worker_config(&self, dry_run: bool, concurrency: Option<usize>) -> WorkerConfig {
        WorkerConfig {
            concurrency: concurrency.unwrap_or(self.sync.workers).max(1),
            poll_interval: Duration::from_secs(self.sync.poll_interval_secs.max(1)),
            run_timeout: chrono::Duration::hours(self.sync.run_timeout_hours.max(1)),
            sync: self.sync_options(dry_run),
            ..WorkerConfig::default()
        }
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "binmirror").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn default_data_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "binmirror").map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// On Linux, `$XDG_STATE_HOME/binmirror` or `~/.local/state/binmirror`.
    /// Elsewhere the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "binmirror").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
