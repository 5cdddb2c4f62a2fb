//! Category → adapter map, resolved once at process start.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::category::{AdapterKind, CategoryConfig, ConfigError};
use crate::http::HttpTransport;
use crate::retry::RetryConfig;

use super::bucket::BucketAdapter;
use super::client::SourceClient;
use super::github::GitHubReleasesAdapter;
use super::index::IndexAdapter;
use super::node_pre_gyp::NodePreGypAdapter;
use super::playwright::PlaywrightAdapter;
use super::rate_limit::{ApiRateLimiter, rate_limits};
use super::BinaryAdapter;

/// Process-wide settings shared by adapters.
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Bearer token for the GitHub API.
    pub github_token: Option<String>,
    /// GitHub pacing; defaults depend on whether a token is set.
    pub github_rps: Option<u32>,
    /// Retry policy for transient upstream failures.
    pub retry: RetryConfig,
}

impl RegistryOptions {
    fn github_rps(&self) -> u32 {
        self.github_rps.unwrap_or(if self.github_token.is_some() {
            rate_limits::GITHUB_DEFAULT_RPS
        } else {
            rate_limits::GITHUB_ANONYMOUS_RPS
        })
    }
}

/// One configured category and its adapter.
#[derive(Clone)]
pub struct CategoryEntry {
    pub name: String,
    pub config: CategoryConfig,
    pub adapter: Arc<dyn BinaryAdapter>,
}

impl std::fmt::Debug for CategoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryEntry")
            .field("name", &self.name)
            .field("adapter", &self.adapter.kind())
            .finish_non_exhaustive()
    }
}

/// Immutable category registry.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    entries: BTreeMap<String, CategoryEntry>,
}

impl AdapterRegistry {
    /// Validate every config and build its adapter.
    ///
    /// All GitHub categories share one limiter so their combined request
    /// rate stays under the account quota.
    pub fn new(
        configs: BTreeMap<String, CategoryConfig>,
        transport: Arc<dyn HttpTransport>,
        options: &RegistryOptions,
    ) -> Result<Self, ConfigError> {
        let client = SourceClient::new(transport).with_retry(options.retry.clone());
        let github_client = client
            .clone()
            .with_rate_limiter(ApiRateLimiter::new(options.github_rps()));

        let mut entries = BTreeMap::new();
        for (name, config) in configs {
            config.validate(&name)?;
            let adapter: Arc<dyn BinaryAdapter> = match config.adapter {
                AdapterKind::Bucket => Arc::new(BucketAdapter::new(client.clone(), &config)),
                AdapterKind::GitHub => Arc::new(GitHubReleasesAdapter::new(
                    github_client.clone(),
                    &config,
                    options.github_token.clone(),
                )),
                AdapterKind::NodePreGyp => {
                    Arc::new(NodePreGypAdapter::new(client.clone(), &config))
                }
                AdapterKind::Index => Arc::new(IndexAdapter::new(client.clone(), &config)),
                AdapterKind::Playwright => {
                    Arc::new(PlaywrightAdapter::new(client.clone(), &config))
                }
            };
            tracing::debug!(category = %name, adapter = adapter.kind(), "Registered category");
            entries.insert(
                name.clone(),
                CategoryEntry {
                    name,
                    config,
                    adapter,
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn get(&self, category: &str) -> Option<&CategoryEntry> {
        self.entries.get(category)
    }

    /// Entries sorted by category name.
    pub fn categories(&self) -> impl Iterator<Item = &CategoryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
