//! Static per-category configuration.
//!
//! Every mirrored category maps to exactly one [`AdapterKind`] plus the
//! handful of settings that adapter needs. The library ships a builtin
//! catalogue ([`builtin_categories`]); the CLI overlays entries from its
//! configuration file on top.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream paradigm of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// S3/GCS/Azure-style XML object listing.
    Bucket,
    /// GitHub releases API.
    #[serde(rename = "github")]
    GitHub,
    /// npm manifest with node-pre-gyp `binary` sections.
    NodePreGyp,
    /// HTML directory index (autoindex `<pre>` or Apache table).
    Index,
    /// Playwright `browsers.json` manifest.
    Playwright,
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterKind::Bucket => write!(f, "bucket"),
            AdapterKind::GitHub => write!(f, "github"),
            AdapterKind::NodePreGyp => write!(f, "node_pre_gyp"),
            AdapterKind::Index => write!(f, "index"),
            AdapterKind::Playwright => write!(f, "playwright"),
        }
    }
}

/// Query dialect of a bucket listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketStyle {
    /// `?delimiter=/&prefix=..&marker=..` (S3 v1, GCS XML API).
    #[default]
    S3,
    /// `?restype=container&comp=list&delimiter=/&prefix=..&marker=..`.
    Azure,
}

/// Expansion axes for node-pre-gyp binaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    pub platforms: Vec<String>,
    pub archs: Vec<String>,
    /// Empty means the template has no libc axis.
    pub libcs: Vec<String>,
    /// Used when the manifest does not declare `binary.napi_versions`.
    pub napi_versions: Vec<u32>,
}

/// Configuration for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub adapter: AdapterKind,
    pub description: String,
    /// Listing root (bucket, index), download host (playwright, npm
    /// override) or API root (github).
    pub base_url: String,
    /// `owner/name` of a GitHub repository.
    pub repo: Option<String>,
    /// npm package name.
    pub package: Option<String>,
    /// Manifest location (playwright `browsers.json`).
    pub manifest_url: Option<String>,
    /// Full directory paths never descended into, e.g. `/v0.1.100/`.
    pub ignored_dirs: Vec<String>,
    /// Full file paths never mirrored.
    pub ignored_files: Vec<String>,
    pub axes: AxisConfig,
    /// Page cap for paginated listings; adapter default when unset.
    pub max_pages: Option<u32>,
    pub bucket_style: BucketStyle,
    /// Also mirror GitHub source tarball/zipball links.
    pub include_source_archives: bool,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterKind::Index,
            description: String::new(),
            base_url: String::new(),
            repo: None,
            package: None,
            manifest_url: None,
            ignored_dirs: Vec::new(),
            ignored_files: Vec::new(),
            axes: AxisConfig::default(),
            max_pages: None,
            bucket_style: BucketStyle::default(),
            include_source_archives: false,
        }
    }
}

/// Invalid category configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("category {category}: {field} is required for the {adapter} adapter")]
    MissingField {
        category: String,
        adapter: AdapterKind,
        field: &'static str,
    },

    #[error("category {category}: invalid {field}: {message}")]
    Invalid {
        category: String,
        field: &'static str,
        message: String,
    },
}

impl CategoryConfig {
    pub fn new(adapter: AdapterKind, base_url: impl Into<String>) -> Self {
        Self {
            adapter,
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Check that the adapter has everything it needs.
    pub fn validate(&self, category: &str) -> Result<(), ConfigError> {
        let missing = |field| ConfigError::MissingField {
            category: category.to_string(),
            adapter: self.adapter,
            field,
        };

        match self.adapter {
            AdapterKind::Bucket | AdapterKind::Index => {
                if self.base_url.is_empty() {
                    return Err(missing("base_url"));
                }
            }
            AdapterKind::GitHub => {
                let repo = self.repo.as_deref().ok_or_else(|| missing("repo"))?;
                if repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
                    return Err(ConfigError::Invalid {
                        category: category.to_string(),
                        field: "repo",
                        message: format!("expected owner/name, got {repo:?}"),
                    });
                }
            }
            AdapterKind::NodePreGyp => {
                if self.package.is_none() {
                    return Err(missing("package"));
                }
                if self.axes.platforms.is_empty() || self.axes.archs.is_empty() {
                    return Err(missing("axes.platforms/axes.archs"));
                }
            }
            AdapterKind::Playwright => {}
        }

        if !self.base_url.is_empty() {
            url::Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
                category: category.to_string(),
                field: "base_url",
                message: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Whether `path` (a full directory path) is excluded.
    pub fn is_ignored_dir(&self, path: &str) -> bool {
        self.ignored_dirs.iter().any(|d| d == path)
    }

    /// Whether `path` (a full file path) is excluded.
    pub fn is_ignored_file(&self, path: &str) -> bool {
        self.ignored_files.iter().any(|f| f == path)
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

/// The builtin category catalogue.
pub fn builtin_categories() -> BTreeMap<String, CategoryConfig> {
    let mut categories = BTreeMap::new();

    categories.insert(
        "chromedriver".to_string(),
        CategoryConfig {
            description: "ChromeDriver builds".to_string(),
            ignored_files: strings(&["/index.html"]),
            ..CategoryConfig::new(
                AdapterKind::Bucket,
                "https://chromedriver.storage.googleapis.com/",
            )
        },
    );

    categories.insert(
        "node".to_string(),
        CategoryConfig {
            description: "Node.js release archive".to_string(),
            ignored_dirs: strings(&["/docs/", "/npm/"]),
            ..CategoryConfig::new(AdapterKind::Index, "https://nodejs.org/dist/")
        },
    );

    categories.insert(
        "python".to_string(),
        CategoryConfig {
            description: "CPython source and installers".to_string(),
            ignored_dirs: strings(&["/doc/"]),
            ..CategoryConfig::new(AdapterKind::Index, "https://www.python.org/ftp/python/")
        },
    );

    categories.insert(
        "electron".to_string(),
        CategoryConfig {
            description: "Electron release assets".to_string(),
            repo: Some("electron/electron".to_string()),
            max_pages: Some(10),
            ..CategoryConfig::new(AdapterKind::GitHub, "https://api.github.com")
        },
    );

    categories.insert(
        "sqlite3".to_string(),
        CategoryConfig {
            description: "node-sqlite3 prebuilt binaries".to_string(),
            package: Some("sqlite3".to_string()),
            axes: AxisConfig {
                platforms: strings(&["darwin", "linux", "win32"]),
                archs: strings(&["x64", "arm64", "ia32"]),
                libcs: strings(&["glibc", "musl"]),
                napi_versions: vec![3, 6],
            },
            ..CategoryConfig::new(AdapterKind::NodePreGyp, "https://registry.npmjs.org")
        },
    );

    categories.insert(
        "playwright".to_string(),
        CategoryConfig {
            description: "Playwright browser builds".to_string(),
            manifest_url: Some(
                "https://raw.githubusercontent.com/microsoft/playwright/main/packages/playwright-core/browsers.json"
                    .to_string(),
            ),
            ..CategoryConfig::new(AdapterKind::Playwright, "https://playwright.azureedge.net/")
        },
    );

    categories
}
