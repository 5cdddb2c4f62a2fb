//! Upstream listing adapters.
//!
//! Every category is backed by one [`BinaryAdapter`] that turns some upstream
//! shape (bucket XML, release JSON, an HTML index, a manifest) into a uniform
//! directory listing of [`BinaryItem`]s. Adapters are stateless between runs;
//! anything they want to remember while one run walks the tree lives in the
//! [`RunCache`] handed back by [`BinaryAdapter::reset`].
//!
//! # Failure contract
//!
//! [`BinaryAdapter::list`] never returns an error. `None` means "this
//! directory is unavailable right now" and the walk skips it; a rate limit
//! additionally halts the run through [`RunCache::halt`]. `Some` with an empty
//! item list is a legitimate, empty directory.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod bucket;
pub mod client;
pub mod date;
pub mod error;
pub mod github;
pub mod index;
pub mod node_pre_gyp;
pub mod playwright;
pub mod rate_limit;
pub mod registry;

pub use client::SourceClient;
pub use error::SourceError;
pub use rate_limit::ApiRateLimiter;
pub use registry::{AdapterRegistry, CategoryEntry, RegistryOptions};

/// Path of the root directory of every category tree.
pub const ROOT_DIR: &str = "/";

// ─── Items ───────────────────────────────────────────────────────────────────

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryItem {
    /// Entry name; directories end with `/`.
    pub name: String,
    pub is_dir: bool,
    /// Size in bytes, `None` when unknown.
    pub size: Option<i64>,
    /// Normalized timestamp (see [`date::normalize_date`]), empty when unknown.
    pub date: String,
    /// Absolute upstream URL; empty for directories.
    pub source_url: String,
    /// Download statuses that mean "expected to be missing".
    pub ignore_download_statuses: Vec<u16>,
}

impl BinaryItem {
    /// Directory entry. A trailing `/` is appended when absent.
    pub fn dir(name: impl Into<String>, date: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            name,
            is_dir: true,
            size: None,
            date: date.into(),
            source_url: String::new(),
            ignore_download_statuses: Vec::new(),
        }
    }

    pub fn file(
        name: impl Into<String>,
        size: Option<i64>,
        date: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size,
            date: date.into(),
            source_url: source_url.into(),
            ignore_download_statuses: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_ignore_statuses(mut self, statuses: &[u16]) -> Self {
        self.ignore_download_statuses = statuses.to_vec();
        self
    }
}

/// One directory listing returned by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub items: Vec<BinaryItem>,
    /// Upstream continuation marker when the listing was cut short by a page
    /// cap. Informational only; it is never persisted.
    pub cursor: Option<String>,
}

impl FetchResult {
    pub fn new(items: Vec<BinaryItem>) -> Self {
        Self {
            items,
            cursor: None,
        }
    }
}

/// Incremental-sync state persisted on the task between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeHint {
    /// Start time of the last run that finished without gaps.
    pub last_synced_at: DateTime<Utc>,
}

impl ResumeHint {
    pub fn new(last_synced_at: DateTime<Utc>) -> Self {
        Self { last_synced_at }
    }

    /// Whether a normalized upstream date is older than the hint.
    ///
    /// Unknown or unparseable dates are never considered old.
    pub fn is_older(&self, normalized_date: &str) -> bool {
        date::parse_normalized(normalized_date).is_some_and(|d| d < self.last_synced_at)
    }
}

// ─── Run State ───────────────────────────────────────────────────────────────

/// Why an adapter asked the walk to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    RateLimited {
        reset_at: Option<DateTime<Utc>>,
    },
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::RateLimited {
                reset_at: Some(reset),
            } => write!(f, "rate limited until {}", reset.to_rfc3339()),
            HaltReason::RateLimited { reset_at: None } => write!(f, "rate limited"),
        }
    }
}

/// Per-run scratch state owned by the walk and lent to the adapter.
///
/// Adapters that learn the whole tree from one upstream call (release lists,
/// package manifests) record every directory here on the first `list` and
/// answer later calls from memory.
#[derive(Debug, Clone, Default)]
pub struct RunCache {
    category: String,
    primed: bool,
    dirs: HashMap<String, Vec<BinaryItem>>,
    cursors: HashMap<String, String>,
    halted: Option<HaltReason>,
}

impl RunCache {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..Self::default()
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Whether the adapter already populated the tree for this run.
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn mark_primed(&mut self) {
        self.primed = true;
    }

    pub fn halt(&mut self, reason: HaltReason) {
        self.halted = Some(reason);
    }

    pub fn halted(&self) -> Option<&HaltReason> {
        self.halted.as_ref()
    }

    /// Mark the cached listing of `dir` as cut short at `cursor`.
    pub fn set_cursor(&mut self, dir: &str, cursor: impl Into<String>) {
        self.cursors.insert(dir.to_string(), cursor.into());
    }

    /// Continuation marker recorded for `dir`, if its listing is partial.
    pub fn cursor(&self, dir: &str) -> Option<&str> {
        self.cursors.get(dir).map(String::as_str)
    }

    /// Cached listing for `dir`, if the adapter recorded one.
    pub fn listing(&self, dir: &str) -> Option<&[BinaryItem]> {
        self.dirs.get(dir).map(Vec::as_slice)
    }

    /// Add `item` under `dir`, creating every ancestor directory entry.
    ///
    /// Entries are deduplicated by name; the first insertion wins.
    pub fn insert(&mut self, dir: &str, item: BinaryItem) {
        self.ensure_dir(dir, &item.date);
        if item.is_dir {
            let child = format!("{dir}{}", item.name);
            self.dirs.entry(child).or_default();
        }
        let entries = self.dirs.entry(dir.to_string()).or_default();
        if !entries.iter().any(|existing| existing.name == item.name) {
            entries.push(item);
        }
    }

    fn ensure_dir(&mut self, dir: &str, date: &str) {
        if self.dirs.contains_key(dir) {
            return;
        }
        self.dirs.insert(dir.to_string(), Vec::new());
        if let Some((parent, name)) = split_dir(dir) {
            self.insert(&parent, BinaryItem::dir(name, date));
        }
    }
}

/// Split a directory path into `(parent, name/)`; `None` for the root.
pub fn split_dir(dir: &str) -> Option<(String, String)> {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let idx = trimmed.rfind('/')?;
    Some((
        trimmed[..=idx].to_string(),
        format!("{}/", &trimmed[idx + 1..]),
    ))
}

/// Join a `/`-delimited relative path below the root into a directory path
/// (`"a/b"` -> `"/a/b/"`).
pub fn dir_path(relative: &str) -> String {
    let trimmed = relative.trim_matches('/');
    if trimmed.is_empty() {
        ROOT_DIR.to_string()
    } else {
        format!("/{trimmed}/")
    }
}

// ─── Adapter Contract ────────────────────────────────────────────────────────

/// A per-category source of directory listings.
#[async_trait]
pub trait BinaryAdapter: Send + Sync {
    /// Short adapter name used in logs.
    fn kind(&self) -> &'static str;

    /// Fresh per-run state. Called once before the walk starts.
    fn reset(&self, category: &str) -> RunCache {
        RunCache::new(category)
    }

    /// List one directory (`/` or `/a/b/`).
    async fn list(
        &self,
        cache: &mut RunCache,
        dir: &str,
        hint: Option<&ResumeHint>,
    ) -> Option<FetchResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dir_items_get_trailing_slash() {
        assert_eq!(BinaryItem::dir("v1.0", "").name, "v1.0/");
        assert_eq!(BinaryItem::dir("v1.0/", "").name, "v1.0/");
        assert!(BinaryItem::dir("x", "").is_dir);
    }

    #[test]
    fn split_dir_walks_up_one_level() {
        assert_eq!(split_dir("/"), None);
        assert_eq!(split_dir("/a/"), Some(("/".to_string(), "a/".to_string())));
        assert_eq!(
            split_dir("/a/b/c/"),
            Some(("/a/b/".to_string(), "c/".to_string()))
        );
    }

    #[test]
    fn dir_path_normalizes_slashes() {
        assert_eq!(dir_path(""), "/");
        assert_eq!(dir_path("v1.0"), "/v1.0/");
        assert_eq!(dir_path("/builds/chromium/"), "/builds/chromium/");
    }

    #[test]
    fn run_cache_insert_creates_ancestors_once() {
        let mut cache = RunCache::new("playwright");
        let date = "2023-08-01T00:00:00.000Z";
        cache.insert(
            "/builds/chromium/1097/",
            BinaryItem::file("chromium-linux.zip", None, date, "https://x/a"),
        );
        cache.insert(
            "/builds/chromium/1097/",
            BinaryItem::file("chromium-linux.zip", None, date, "https://x/b"),
        );
        cache.insert(
            "/builds/firefox/1400/",
            BinaryItem::file("firefox-win64.zip", None, date, "https://x/c"),
        );

        let root = cache.listing("/").expect("root");
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].name, "builds/");

        let builds = cache.listing("/builds/").expect("builds");
        let names: Vec<_> = builds.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["chromium/", "firefox/"]);

        let files = cache.listing("/builds/chromium/1097/").expect("files");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].source_url, "https://x/a");
    }

    #[test]
    fn run_cache_records_halt() {
        let mut cache = RunCache::new("electron");
        assert!(cache.halted().is_none());
        cache.halt(HaltReason::RateLimited { reset_at: None });
        assert_eq!(cache.halted().map(ToString::to_string).as_deref(), Some("rate limited"));
    }

    #[test]
    fn resume_hint_compares_normalized_dates() {
        let hint = ResumeHint::new(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap());
        assert!(hint.is_older("2021-12-17T20:10:00.000Z"));
        assert!(!hint.is_older("2022-02-01T00:00:00.000Z"));
        assert!(!hint.is_older(""));
    }
}
