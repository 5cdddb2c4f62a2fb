//! Sync options, the per-run report, and shared constants.

use chrono::{DateTime, Utc};

use crate::retry::RetryConfig;

/// Default number of concurrent blob downloads within one run.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 8;

/// Default upper bound on directories visited in one run.
pub const DEFAULT_MAX_DIRS: usize = 50_000;

/// Default deepest directory level that is still listed.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Maximum backoff delay in milliseconds between retries.
pub const MAX_BACKOFF_MS: u64 = 5_000;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 200;

/// Maximum retries for one transient failure.
pub const MAX_RETRIES: usize = 3;

/// Options for one category run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// List and count only; write neither nodes nor blobs.
    pub dry_run: bool,
    /// Maximum concurrent blob downloads. Each download buffers its whole
    /// body, so this also bounds memory use.
    pub download_concurrency: usize,
    /// Stop the walk after this many directories.
    pub max_dirs: usize,
    /// Do not descend into directories nested deeper than this.
    pub max_depth: usize,
    /// Retry policy for database writes.
    pub retry: RetryConfig,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            max_dirs: DEFAULT_MAX_DIRS,
            max_depth: DEFAULT_MAX_DEPTH,
            retry: RetryConfig::default(),
        }
    }
}

/// Outcome of one category run.
///
/// Per-directory and per-file failures are counted here rather than turned
/// into errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub category: String,
    /// When the walk started; becomes the next resume hint.
    pub started_at: DateTime<Utc>,
    pub dirs_listed: usize,
    /// Directories whose listing failed this run.
    pub dirs_unavailable: usize,
    /// Listings cut short by an upstream page cap.
    pub dirs_partial: usize,
    /// Items returned by adapters after ignore filtering.
    pub nodes_seen: usize,
    /// Nodes written to the database.
    pub nodes_saved: usize,
    /// Items dropped by the category ignore lists.
    pub items_ignored: usize,
    /// Items skipped because their name is not a valid node name.
    pub items_rejected: usize,
    /// Directories not descended because they repeat an ancestor listing.
    pub cycles_skipped: usize,
    /// Directories not descended because of `max_depth`.
    pub dirs_too_deep: usize,
    pub files_downloaded: usize,
    /// Files left alone because nothing changed upstream.
    pub files_skipped: usize,
    /// Files answering with one of their ignored statuses.
    pub files_missing: usize,
    pub download_errors: usize,
    pub bytes_downloaded: u64,
    /// Why the adapter stopped the run early.
    pub halted: Option<String>,
    /// The walk hit the `max_dirs` bound.
    pub truncated: bool,
}

impl SyncReport {
    pub fn new(category: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            category: category.into(),
            started_at,
            dirs_listed: 0,
            dirs_unavailable: 0,
            dirs_partial: 0,
            nodes_seen: 0,
            nodes_saved: 0,
            items_ignored: 0,
            items_rejected: 0,
            cycles_skipped: 0,
            dirs_too_deep: 0,
            files_downloaded: 0,
            files_skipped: 0,
            files_missing: 0,
            download_errors: 0,
            bytes_downloaded: 0,
            halted: None,
            truncated: false,
        }
    }

    /// Whether the run saw the whole upstream tree without gaps.
    pub fn is_complete(&self) -> bool {
        self.dirs_unavailable == 0
            && self.dirs_partial == 0
            && self.download_errors == 0
            && self.dirs_too_deep == 0
            && self.halted.is_none()
            && !self.truncated
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{}: {} dirs listed, {} nodes saved, {} downloaded, {} skipped, {} missing",
            self.category,
            self.dirs_listed,
            self.nodes_saved,
            self.files_downloaded,
            self.files_skipped,
            self.files_missing,
        );
        if self.dirs_unavailable > 0 {
            summary.push_str(&format!(", {} dirs unavailable", self.dirs_unavailable));
        }
        if self.download_errors > 0 {
            summary.push_str(&format!(", {} download errors", self.download_errors));
        }
        if self.items_rejected > 0 {
            summary.push_str(&format!(", {} items rejected", self.items_rejected));
        }
        if self.cycles_skipped > 0 {
            summary.push_str(&format!(", {} cyclic dirs skipped", self.cycles_skipped));
        }
        if self.dirs_too_deep > 0 {
            summary.push_str(&format!(", {} dirs too deep", self.dirs_too_deep));
        }
        if let Some(reason) = &self.halted {
            summary.push_str(&format!(" (halted: {reason})"));
        }
        if self.truncated {
            summary.push_str(" (truncated)");
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_options_default() {
        let options = SyncOptions::default();
        assert!(!options.dry_run);
        assert_eq!(options.download_concurrency, DEFAULT_DOWNLOAD_CONCURRENCY);
        assert_eq!(options.max_dirs, DEFAULT_MAX_DIRS);
        assert_eq!(options.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(options.retry, RetryConfig::default());
    }

    #[test]
    fn report_completeness() {
        let mut report = SyncReport::new("node", Utc::now());
        assert!(report.is_complete());

        report.files_missing = 4;
        assert!(report.is_complete(), "expected-missing files are not gaps");

        report.dirs_unavailable = 1;
        assert!(!report.is_complete());
        report.dirs_unavailable = 0;

        report.halted = Some("rate limited".to_string());
        assert!(!report.is_complete());
        report.halted = None;

        report.truncated = true;
        assert!(!report.is_complete());
        report.truncated = false;

        report.items_rejected = 1;
        report.cycles_skipped = 1;
        assert!(report.is_complete(), "skipped items are not gaps");

        report.dirs_too_deep = 1;
        assert!(!report.is_complete());
    }

    #[test]
    fn summary_mentions_problems_only_when_present() {
        let mut report = SyncReport::new("electron", Utc::now());
        report.dirs_listed = 3;
        let clean = report.summary();
        assert!(clean.starts_with("electron: 3 dirs listed"));
        assert!(!clean.contains("unavailable"));

        report.dirs_unavailable = 2;
        report.halted = Some("rate limited".to_string());
        let dirty = report.summary();
        assert!(dirty.contains("2 dirs unavailable"));
        assert!(dirty.contains("halted: rate limited"));
    }
}
