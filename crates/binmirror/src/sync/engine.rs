//! Breadth-first category walk.
//!
//! ```text
//! adapter.list(dir) → ignore filter → upsert node → enqueue child dirs
//!                                                 → download changed files
//! ```
//!
//! Directories are visited from a FIFO queue starting at `/`. A parent node
//! is always written before any of its children are listed. Failures below
//! the database layer are counted in the [`SyncReport`]; only database errors
//! abort the run.
//!
//! Each directory is listed at most once per run. A directory whose listing
//! repeats one of its ancestors (an upstream symlink loop) is not descended,
//! and nothing deeper than `max_depth` segments is enqueued.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::Utc;
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::repository::{self, RepositoryError};
use crate::source::{BinaryItem, CategoryEntry, ROOT_DIR, ResumeHint, SourceClient, split_dir};
use crate::storage::BlobStore;

use super::download::{DownloadJob, DownloadOutcome, fetch_blob, needs_download};
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{SyncOptions, SyncReport};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("unknown category: {0}")]
    UnknownCategory(String),
}

/// Shared dependencies of a run.
pub struct SyncContext<'a> {
    pub db: &'a DatabaseConnection,
    pub store: Arc<dyn BlobStore>,
    /// Client used for blob downloads.
    pub downloader: SourceClient,
    pub options: SyncOptions,
}

/// Run one full walk of `entry`.
///
/// # Errors
/// Returns `SyncError::Repository` if a node cannot be written after retries.
pub async fn sync_category(
    ctx: &SyncContext<'_>,
    entry: &CategoryEntry,
    hint: Option<&ResumeHint>,
    on_progress: Option<&ProgressCallback>,
) -> Result<SyncReport, SyncError> {
    let category = entry.name.as_str();
    let mut report = SyncReport::new(category, Utc::now());
    let mut cache = entry.adapter.reset(category);

    tracing::info!(
        category,
        adapter = entry.adapter.kind(),
        incremental = hint.is_some(),
        dry_run = ctx.options.dry_run,
        "Starting category sync"
    );
    emit(
        on_progress,
        SyncProgress::RunStarted {
            category: category.to_string(),
            adapter: entry.adapter.kind().to_string(),
            incremental: hint.is_some(),
        },
    );

    let mut queue = VecDeque::from([ROOT_DIR.to_string()]);
    let mut visited = HashSet::new();
    let mut fingerprints: HashMap<String, u64> = HashMap::new();

    while let Some(dir) = queue.pop_front() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        if report.dirs_listed + report.dirs_unavailable >= ctx.options.max_dirs {
            tracing::warn!(category, max_dirs = ctx.options.max_dirs, "Directory bound reached");
            emit(
                on_progress,
                SyncProgress::Truncated {
                    category: category.to_string(),
                    max_dirs: ctx.options.max_dirs,
                },
            );
            report.truncated = true;
            break;
        }

        let listed = entry.adapter.list(&mut cache, &dir, hint).await;

        if let Some(reason) = cache.halted() {
            let reason = reason.to_string();
            tracing::warn!(category, dir = %dir, %reason, pending = queue.len(), "Sync halted by adapter");
            emit(
                on_progress,
                SyncProgress::Halted {
                    category: category.to_string(),
                    reason: reason.clone(),
                },
            );
            report.halted = Some(reason);
            break;
        }

        let Some(result) = listed else {
            tracing::warn!(category, dir = %dir, "Directory unavailable");
            report.dirs_unavailable += 1;
            emit(
                on_progress,
                SyncProgress::DirUnavailable {
                    category: category.to_string(),
                    dir,
                },
            );
            continue;
        };
        report.dirs_listed += 1;
        if let Some(cursor) = &result.cursor {
            tracing::warn!(category, dir = %dir, cursor = %cursor, "Listing truncated by page cap");
            report.dirs_partial += 1;
        }

        let items: Vec<BinaryItem> = result
            .items
            .into_iter()
            .filter(|item| {
                let path = format!("{dir}{}", item.name);
                let ignored = if item.is_dir {
                    entry.config.is_ignored_dir(&path)
                } else {
                    entry.config.is_ignored_file(&path)
                };
                if ignored {
                    tracing::debug!(category, path = %path, "Ignored by category config");
                    report.items_ignored += 1;
                }
                !ignored
            })
            .collect();

        let fingerprint = listing_fingerprint(&items);
        if items.iter().any(|item| item.is_dir) && repeats_ancestor(&dir, fingerprint, &fingerprints) {
            tracing::warn!(category, dir = %dir, "Directory repeats an ancestor listing, not descending");
            report.cycles_skipped += 1;
            emit(
                on_progress,
                SyncProgress::CycleDetected {
                    category: category.to_string(),
                    dir,
                },
            );
            continue;
        }
        fingerprints.insert(dir.clone(), fingerprint);

        tracing::debug!(category, dir = %dir, items = items.len(), "Listed directory");
        emit(
            on_progress,
            SyncProgress::DirListed {
                category: category.to_string(),
                dir: dir.clone(),
                items: items.len(),
            },
        );

        let jobs = persist_listing(ctx, category, &dir, items, &mut queue, &mut report, on_progress).await?;
        run_downloads(ctx, category, jobs, &mut report, on_progress).await?;
    }

    let complete = report.is_complete();
    tracing::info!(category, complete, summary = %report.summary(), "Category sync finished");
    emit(
        on_progress,
        SyncProgress::RunFinished {
            category: category.to_string(),
            summary: report.summary(),
            complete,
        },
    );

    Ok(report)
}

/// Order-independent fingerprint of a listing's entry names.
fn listing_fingerprint(items: &[BinaryItem]) -> u64 {
    let mut names: Vec<&str> = items.iter().map(|item| item.name.as_str()).collect();
    names.sort_unstable();
    let mut hasher = DefaultHasher::new();
    names.hash(&mut hasher);
    hasher.finish()
}

/// Whether some ancestor of `dir` produced the same listing, i.e. the
/// upstream serves a directory that contains itself.
fn repeats_ancestor(dir: &str, fingerprint: u64, fingerprints: &HashMap<String, u64>) -> bool {
    let mut current = dir.to_string();
    while let Some((parent, _)) = split_dir(&current) {
        if fingerprints.get(&parent) == Some(&fingerprint) {
            return true;
        }
        current = parent;
    }
    false
}

/// Number of path segments below the root (`/a/b/` is 2).
fn depth(path: &str) -> usize {
    path.split('/').filter(|segment| !segment.is_empty()).count()
}

/// Upsert every item of one listing and collect the files to fetch.
///
/// Items whose address the repository would reject are skipped and counted;
/// they never abort the run.
async fn persist_listing(
    ctx: &SyncContext<'_>,
    category: &str,
    dir: &str,
    items: Vec<BinaryItem>,
    queue: &mut VecDeque<String>,
    report: &mut SyncReport,
    on_progress: Option<&ProgressCallback>,
) -> Result<Vec<DownloadJob>, SyncError> {
    let mut jobs = Vec::new();

    for item in items {
        report.nodes_seen += 1;
        let path = format!("{dir}{}", item.name);

        if let Err(e) = repository::validate_address(category, dir, &item) {
            tracing::warn!(category, dir, name = %item.name, error = %e, "Rejected listing item");
            report.items_rejected += 1;
            emit(
                on_progress,
                SyncProgress::ItemRejected {
                    category: category.to_string(),
                    path,
                    reason: e.to_string(),
                },
            );
            continue;
        }

        let descend = if item.is_dir && depth(&path) > ctx.options.max_depth {
            tracing::warn!(
                category,
                path = %path,
                max_depth = ctx.options.max_depth,
                "Directory too deep, not descending"
            );
            report.dirs_too_deep += 1;
            false
        } else {
            item.is_dir
        };

        if ctx.options.dry_run {
            if descend {
                queue.push_back(path);
            }
            continue;
        }

        let existing = repository::find(ctx.db, category, dir, &item.name).await?;
        repository::save_with_retry(ctx.db, category, dir, &item, &ctx.options.retry).await?;
        report.nodes_saved += 1;

        if item.is_dir {
            if descend {
                queue.push_back(path);
            }
            continue;
        }

        if needs_download(ctx.store.as_ref(), category, dir, existing.as_ref(), &item).await {
            jobs.push(DownloadJob {
                parent: dir.to_string(),
                was_missing: existing.is_some_and(|n| n.missing),
                item,
            });
        } else {
            report.files_skipped += 1;
        }
    }

    Ok(jobs)
}

/// Fetch `jobs` concurrently, then record outcomes from this task.
async fn run_downloads(
    ctx: &SyncContext<'_>,
    category: &str,
    jobs: Vec<DownloadJob>,
    report: &mut SyncReport,
    on_progress: Option<&ProgressCallback>,
) -> Result<(), SyncError> {
    if jobs.is_empty() {
        return Ok(());
    }

    let concurrency = ctx.options.download_concurrency.clamp(1, jobs.len());
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(jobs.len());

    for job in jobs {
        let semaphore = Arc::clone(&semaphore);
        let client = ctx.downloader.clone();
        let store = Arc::clone(&ctx.store);
        let category = category.to_string();

        handles.push(tokio::spawn(async move {
            let outcome = match semaphore.acquire().await {
                Ok(_permit) => fetch_blob(&client, store, &category, &job).await,
                Err(_) => DownloadOutcome::Failed {
                    message: "Semaphore closed unexpectedly".to_string(),
                },
            };
            (job, outcome)
        }));
    }

    for handle in handles {
        let (job, outcome) = match handle.await {
            Ok(done) => done,
            Err(e) => {
                tracing::error!(category, error = %e, "Download task panicked");
                report.download_errors += 1;
                continue;
            }
        };
        let path = job.path();

        match outcome {
            DownloadOutcome::Stored { bytes } => {
                if job.was_missing {
                    repository::mark_missing(ctx.db, category, &job.parent, &job.item.name, false)
                        .await?;
                }
                tracing::debug!(category, path = %path, bytes, "Downloaded");
                report.files_downloaded += 1;
                report.bytes_downloaded += bytes;
                emit(
                    on_progress,
                    SyncProgress::Downloaded {
                        category: category.to_string(),
                        path,
                        bytes,
                    },
                );
            }
            DownloadOutcome::ExpectedMissing { status } => {
                repository::mark_missing(ctx.db, category, &job.parent, &job.item.name, true)
                    .await?;
                tracing::debug!(category, path = %path, status, "Expected missing");
                report.files_missing += 1;
                emit(
                    on_progress,
                    SyncProgress::ExpectedMissing {
                        category: category.to_string(),
                        path,
                        status,
                    },
                );
            }
            DownloadOutcome::Failed { message } => {
                tracing::warn!(category, path = %path, error = %message, "Download failed");
                report.download_errors += 1;
                emit(
                    on_progress,
                    SyncProgress::DownloadFailed {
                        category: category.to_string(),
                        path,
                        error: message,
                    },
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{AdapterKind, CategoryConfig};
    use crate::source::{BinaryAdapter, FetchResult, HaltReason, RunCache};
    use crate::storage::MemoryBlobStore;
    use crate::http::MockTransport;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Adapter serving fixed listings and recording the visit order.
    struct FixtureAdapter {
        listings: HashMap<String, Vec<BinaryItem>>,
        halt_at: Option<String>,
        visits: Mutex<Vec<String>>,
    }

    impl FixtureAdapter {
        fn new(listings: &[(&str, Vec<BinaryItem>)]) -> Self {
            Self {
                listings: listings
                    .iter()
                    .map(|(dir, items)| ((*dir).to_string(), items.clone()))
                    .collect(),
                halt_at: None,
                visits: Mutex::new(Vec::new()),
            }
        }

        fn visits(&self) -> Vec<String> {
            self.visits.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait]
    impl BinaryAdapter for FixtureAdapter {
        fn kind(&self) -> &'static str {
            "fixture"
        }

        async fn list(
            &self,
            cache: &mut RunCache,
            dir: &str,
            _hint: Option<&ResumeHint>,
        ) -> Option<FetchResult> {
            self.visits
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(dir.to_string());
            if self.halt_at.as_deref() == Some(dir) {
                cache.halt(HaltReason::RateLimited { reset_at: None });
                return None;
            }
            self.listings.get(dir).cloned().map(FetchResult::new)
        }
    }

    fn entry(adapter: Arc<FixtureAdapter>, config: CategoryConfig) -> CategoryEntry {
        CategoryEntry {
            name: "fixture".to_string(),
            config,
            adapter,
        }
    }

    fn tree() -> Vec<(&'static str, Vec<BinaryItem>)> {
        vec![
            ("/", vec![BinaryItem::dir("a", ""), BinaryItem::dir("b", "")]),
            ("/a/", vec![BinaryItem::dir("c", "")]),
            ("/b/", vec![]),
            ("/a/c/", vec![]),
        ]
    }

    #[tokio::test]
    async fn dry_run_walks_breadth_first_without_writes() {
        let adapter = Arc::new(FixtureAdapter::new(&tree()));
        let entry = entry(
            Arc::clone(&adapter),
            CategoryConfig::new(AdapterKind::Index, "https://up.test/"),
        );
        let db = sea_orm::DatabaseConnection::Disconnected;
        let ctx = SyncContext {
            db: &db,
            store: Arc::new(MemoryBlobStore::new()),
            downloader: SourceClient::new(Arc::new(MockTransport::new())),
            options: SyncOptions {
                dry_run: true,
                ..SyncOptions::default()
            },
        };

        let report = sync_category(&ctx, &entry, None, None).await.expect("dry run");
        assert_eq!(adapter.visits(), vec!["/", "/a/", "/b/", "/a/c/"]);
        assert_eq!(report.dirs_listed, 4);
        assert_eq!(report.nodes_seen, 3);
        assert_eq!(report.nodes_saved, 0);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn directories_are_listed_once() {
        let adapter = Arc::new(FixtureAdapter::new(&[
            ("/", vec![BinaryItem::dir("a", ""), BinaryItem::dir("a", "")]),
            ("/a/", vec![]),
        ]));
        let entry = entry(
            Arc::clone(&adapter),
            CategoryConfig::new(AdapterKind::Index, "https://up.test/"),
        );
        let db = sea_orm::DatabaseConnection::Disconnected;
        let ctx = SyncContext {
            db: &db,
            store: Arc::new(MemoryBlobStore::new()),
            downloader: SourceClient::new(Arc::new(MockTransport::new())),
            options: SyncOptions {
                dry_run: true,
                ..SyncOptions::default()
            },
        };

        let report = sync_category(&ctx, &entry, None, None).await.expect("dry run");
        assert_eq!(adapter.visits(), vec!["/", "/a/"]);
        assert_eq!(report.dirs_listed, 2);
    }

    #[tokio::test]
    async fn ignored_dirs_are_not_descended() {
        let adapter = Arc::new(FixtureAdapter::new(&tree()));
        let config = CategoryConfig {
            ignored_dirs: vec!["/a/".to_string()],
            ..CategoryConfig::new(AdapterKind::Index, "https://up.test/")
        };
        let entry = entry(Arc::clone(&adapter), config);
        let db = sea_orm::DatabaseConnection::Disconnected;
        let ctx = SyncContext {
            db: &db,
            store: Arc::new(MemoryBlobStore::new()),
            downloader: SourceClient::new(Arc::new(MockTransport::new())),
            options: SyncOptions {
                dry_run: true,
                ..SyncOptions::default()
            },
        };

        let report = sync_category(&ctx, &entry, None, None).await.expect("dry run");
        assert_eq!(adapter.visits(), vec!["/", "/b/"]);
        assert_eq!(report.items_ignored, 1);
    }

    #[tokio::test]
    async fn halt_stops_the_walk_and_max_dirs_truncates() {
        let mut halting = FixtureAdapter::new(&tree());
        halting.halt_at = Some("/a/".to_string());
        let adapter = Arc::new(halting);
        let entry_halting = entry(
            Arc::clone(&adapter),
            CategoryConfig::new(AdapterKind::GitHub, "https://api.test"),
        );
        let db = sea_orm::DatabaseConnection::Disconnected;
        let mut ctx = SyncContext {
            db: &db,
            store: Arc::new(MemoryBlobStore::new()),
            downloader: SourceClient::new(Arc::new(MockTransport::new())),
            options: SyncOptions {
                dry_run: true,
                ..SyncOptions::default()
            },
        };

        let report = sync_category(&ctx, &entry_halting, None, None)
            .await
            .expect("halted run");
        assert_eq!(adapter.visits(), vec!["/", "/a/"]);
        assert_eq!(report.halted.as_deref(), Some("rate limited"));
        assert!(!report.is_complete());

        ctx.options.max_dirs = 2;
        let bounded = Arc::new(FixtureAdapter::new(&tree()));
        let entry_bounded = entry(
            Arc::clone(&bounded),
            CategoryConfig::new(AdapterKind::Index, "https://up.test/"),
        );
        let report = sync_category(&ctx, &entry_bounded, None, None)
            .await
            .expect("bounded run");
        assert_eq!(bounded.visits(), vec!["/", "/a/"]);
        assert!(report.truncated);
    }

    fn dry_run_ctx(db: &sea_orm::DatabaseConnection) -> SyncContext<'_> {
        SyncContext {
            db,
            store: Arc::new(MemoryBlobStore::new()),
            downloader: SourceClient::new(Arc::new(MockTransport::new())),
            options: SyncOptions {
                dry_run: true,
                ..SyncOptions::default()
            },
        }
    }

    #[tokio::test]
    async fn halt_on_the_last_listing_is_reported() {
        let mut halting = FixtureAdapter::new(&tree());
        halting.halt_at = Some("/".to_string());
        let adapter = Arc::new(halting);
        let entry = entry(
            Arc::clone(&adapter),
            CategoryConfig::new(AdapterKind::GitHub, "https://api.test"),
        );
        let db = sea_orm::DatabaseConnection::Disconnected;
        let ctx = dry_run_ctx(&db);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |event| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        });

        let report = sync_category(&ctx, &entry, None, Some(&callback))
            .await
            .expect("halted run");
        assert_eq!(adapter.visits(), vec!["/"]);
        assert_eq!(report.halted.as_deref(), Some("rate limited"));
        assert_eq!(report.dirs_unavailable, 0);
        assert!(report.summary().contains("halted: rate limited"));

        let events = events.lock().unwrap_or_else(|e| e.into_inner());
        assert!(events.iter().any(|e| matches!(e, SyncProgress::Halted { .. })));
    }

    #[tokio::test]
    async fn invalid_names_are_skipped_not_fatal() {
        let adapter = Arc::new(FixtureAdapter::new(&[
            (
                "/",
                vec![
                    BinaryItem::dir("release/1.0", ""),
                    BinaryItem::file("nested/a.zip", None, "", "https://up.test/a.zip"),
                    BinaryItem::dir("v2.0.0", ""),
                ],
            ),
            ("/v2.0.0/", vec![]),
        ]));
        let entry = entry(
            Arc::clone(&adapter),
            CategoryConfig::new(AdapterKind::Index, "https://up.test/"),
        );
        let db = sea_orm::DatabaseConnection::Disconnected;

        let report = sync_category(&dry_run_ctx(&db), &entry, None, None)
            .await
            .expect("bad names do not abort the run");
        assert_eq!(adapter.visits(), vec!["/", "/v2.0.0/"]);
        assert_eq!(report.items_rejected, 2);
        assert!(report.is_complete());
    }

    /// Answers every directory with a single subdirectory.
    struct LoopAdapter {
        child: fn(&str) -> String,
        visits: Mutex<Vec<String>>,
    }

    impl LoopAdapter {
        fn new(child: fn(&str) -> String) -> Self {
            Self {
                child,
                visits: Mutex::new(Vec::new()),
            }
        }

        fn visits(&self) -> Vec<String> {
            self.visits.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait]
    impl BinaryAdapter for LoopAdapter {
        fn kind(&self) -> &'static str {
            "loop"
        }

        async fn list(
            &self,
            _cache: &mut RunCache,
            dir: &str,
            _hint: Option<&ResumeHint>,
        ) -> Option<FetchResult> {
            self.visits
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(dir.to_string());
            Some(FetchResult::new(vec![BinaryItem::dir((self.child)(dir), "")]))
        }
    }

    fn loop_entry(adapter: Arc<LoopAdapter>) -> CategoryEntry {
        CategoryEntry {
            name: "loop".to_string(),
            config: CategoryConfig::new(AdapterKind::Index, "https://up.test/"),
            adapter,
        }
    }

    #[tokio::test]
    async fn self_listing_directory_is_not_descended() {
        let adapter = Arc::new(LoopAdapter::new(|_| "loop".to_string()));
        let db = sea_orm::DatabaseConnection::Disconnected;
        let mut ctx = dry_run_ctx(&db);
        ctx.options.max_dirs = 25;

        let report = sync_category(&ctx, &loop_entry(Arc::clone(&adapter)), None, None)
            .await
            .expect("dry run");
        assert_eq!(adapter.visits(), vec!["/", "/loop/"]);
        assert_eq!(report.cycles_skipped, 1);
        assert!(!report.truncated);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn alternating_loop_is_caught_at_the_repeat() {
        let adapter = Arc::new(LoopAdapter::new(|dir| {
            (if dir.ends_with("/a/") { "b" } else { "a" }).to_string()
        }));
        let db = sea_orm::DatabaseConnection::Disconnected;

        let report = sync_category(&dry_run_ctx(&db), &loop_entry(Arc::clone(&adapter)), None, None)
            .await
            .expect("dry run");
        assert_eq!(adapter.visits(), vec!["/", "/a/", "/a/b/"]);
        assert_eq!(report.cycles_skipped, 1);
    }

    #[tokio::test]
    async fn depth_cap_stops_descent() {
        let adapter = Arc::new(LoopAdapter::new(|dir| format!("d{}", depth(dir) + 1)));
        let db = sea_orm::DatabaseConnection::Disconnected;
        let mut ctx = dry_run_ctx(&db);
        ctx.options.max_depth = 3;

        let report = sync_category(&ctx, &loop_entry(Arc::clone(&adapter)), None, None)
            .await
            .expect("dry run");
        assert_eq!(
            adapter.visits(),
            vec!["/", "/d1/", "/d1/d2/", "/d1/d2/d3/"]
        );
        assert_eq!(report.dirs_too_deep, 1);
        assert!(!report.is_complete());
    }
}
