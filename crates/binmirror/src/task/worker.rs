//! Worker pool executing claimed sync tasks.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use sea_orm::DatabaseConnection;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::entity::sync_task::Model as SyncTask;
use crate::source::{AdapterRegistry, ResumeHint, SourceClient};
use crate::storage::BlobStore;
use crate::sync::{ProgressCallback, SyncContext, SyncOptions, sync_category};

use super::{TaskEngine, TaskError, resume_hint};

/// Default number of categories synced concurrently.
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;

/// Tuning knobs of a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum categories running at once.
    pub concurrency: usize,
    /// Sleep between polls of an empty queue.
    pub poll_interval: StdDuration,
    /// Wall-clock budget of one run; longer runs are cancelled and failed.
    pub run_timeout: Duration,
    /// How often the timeout sweep runs.
    pub sweep_interval: StdDuration,
    pub sync: SyncOptions,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_WORKER_CONCURRENCY,
            poll_interval: StdDuration::from_secs(5),
            run_timeout: Duration::hours(6),
            sweep_interval: StdDuration::from_secs(60),
            sync: SyncOptions::default(),
        }
    }
}

/// How one claimed task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The run saw the whole tree; the resume hint advanced.
    Complete,
    /// The run finished with gaps or was halted.
    Incomplete,
    Failed,
    /// The run exceeded `run_timeout` and was cancelled.
    TimedOut,
    /// The task was reclaimed while this run was going; its result was
    /// dropped.
    Superseded,
}

/// Counters accumulated by a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub complete: usize,
    pub incomplete: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub superseded: usize,
}

impl WorkerStats {
    fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Complete => self.complete += 1,
            TaskOutcome::Incomplete => self.incomplete += 1,
            TaskOutcome::Failed => self.failed += 1,
            TaskOutcome::TimedOut => self.timed_out += 1,
            TaskOutcome::Superseded => self.superseded += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.complete + self.incomplete + self.failed + self.timed_out + self.superseded
    }
}

/// Pulls tasks from a [`TaskEngine`] and runs them.
#[derive(Clone)]
pub struct WorkerPool {
    engine: Arc<dyn TaskEngine>,
    registry: Arc<AdapterRegistry>,
    db: Arc<DatabaseConnection>,
    store: Arc<dyn BlobStore>,
    downloader: SourceClient,
    config: WorkerConfig,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl WorkerPool {
    pub fn new(
        engine: Arc<dyn TaskEngine>,
        registry: Arc<AdapterRegistry>,
        db: Arc<DatabaseConnection>,
        store: Arc<dyn BlobStore>,
        downloader: SourceClient,
        config: WorkerConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            db,
            store,
            downloader,
            config,
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    /// Run one claimed task to its terminal state.
    ///
    /// The walk is cancelled once it exceeds `run_timeout` and the task is
    /// failed, so a stuck run never overlaps with a later claim of the same
    /// category. Sync failures are recorded on the task; only task-store
    /// errors are returned.
    pub async fn execute(&self, task: SyncTask) -> Result<TaskOutcome, TaskError> {
        let Some(entry) = self.registry.get(&task.category) else {
            tracing::error!(category = %task.category, "No adapter configured for category");
            let note = format!("unknown category: {}", task.category);
            return self.finish(&task, self.engine.mark_failed(&task, &note).await, TaskOutcome::Failed);
        };

        let hint = match resume_hint(&task) {
            Ok(hint) => hint,
            Err(e) => {
                tracing::warn!(category = %task.category, error = %e, "Ignoring unreadable resume hint");
                None
            }
        };

        let ctx = SyncContext {
            db: self.db.as_ref(),
            store: Arc::clone(&self.store),
            downloader: self.downloader.clone(),
            options: self.config.sync.clone(),
        };

        let budget = self.config.run_timeout.to_std().unwrap_or(StdDuration::ZERO);
        let walk = sync_category(&ctx, entry, hint.as_ref(), self.on_progress.as_deref());
        let Ok(result) = tokio::time::timeout(budget, walk).await else {
            tracing::warn!(
                category = %task.category,
                budget_secs = budget.as_secs(),
                "Sync run exceeded its budget, cancelled"
            );
            let note = format!("run timed out after {}s", budget.as_secs());
            let marked = self.engine.mark_failed(&task, &note).await;
            return self.finish(&task, marked, TaskOutcome::TimedOut);
        };

        match result {
            Ok(report) if report.is_complete() && !ctx.options.dry_run => {
                let next = ResumeHint::new(report.started_at);
                let marked = self
                    .engine
                    .mark_complete(&task, Some(&next), Some(report.summary()))
                    .await;
                self.finish(&task, marked, TaskOutcome::Complete)
            }
            Ok(report) => {
                let marked = self
                    .engine
                    .mark_complete(&task, None, Some(report.summary()))
                    .await;
                self.finish(&task, marked, TaskOutcome::Incomplete)
            }
            Err(e) => {
                tracing::error!(category = %task.category, error = %e, "Category sync failed");
                let marked = self.engine.mark_failed(&task, &e.to_string()).await;
                self.finish(&task, marked, TaskOutcome::Failed)
            }
        }
    }

    /// Map the result of finishing `task` to the run's outcome.
    fn finish(
        &self,
        task: &SyncTask,
        marked: Result<(), TaskError>,
        outcome: TaskOutcome,
    ) -> Result<TaskOutcome, TaskError> {
        match marked {
            Ok(()) => Ok(outcome),
            Err(TaskError::ClaimLost { attempt, .. }) => {
                tracing::warn!(
                    category = %task.category,
                    attempt,
                    "Run superseded by a newer claim"
                );
                Ok(TaskOutcome::Superseded)
            }
            Err(e) => Err(e),
        }
    }

    /// Budget after which the sweep treats a `processing` task as abandoned.
    ///
    /// One sweep interval longer than `run_timeout`, so runs of this pool are
    /// cancelled by their own timer before the sweep can requeue them.
    fn sweep_budget(&self) -> Duration {
        let interval =
            Duration::from_std(self.config.sweep_interval).unwrap_or_else(|_| Duration::zero());
        self.config.run_timeout + interval
    }

    /// Claim tasks until the pool is full or the queue is empty.
    async fn fill(&self, running: &mut JoinSet<Result<TaskOutcome, TaskError>>) -> Result<(), TaskError> {
        let concurrency = self.config.concurrency.max(1);
        while running.len() < concurrency {
            let Some(task) = self.engine.poll_next_runnable().await? else {
                break;
            };
            tracing::info!(category = %task.category, attempt = task.attempts, "Starting sync task");
            let pool = self.clone();
            running.spawn(async move { pool.execute(task).await });
        }
        Ok(())
    }

    /// Run every runnable task, then return.
    pub async fn run_until_idle(&self) -> Result<WorkerStats, TaskError> {
        let mut stats = WorkerStats::default();
        let mut running = JoinSet::new();

        loop {
            self.fill(&mut running).await?;
            let Some(joined) = running.join_next().await else {
                break;
            };
            record(&mut stats, joined)?;
        }

        Ok(stats)
    }

    /// Poll and run tasks until `shutdown` turns `true`, then wait for
    /// in-flight runs to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<WorkerStats, TaskError> {
        let mut stats = WorkerStats::default();
        let mut running = JoinSet::new();
        let mut last_sweep: Option<Instant> = None;

        tracing::info!(concurrency = self.config.concurrency, "Worker pool started");

        while !*shutdown.borrow() {
            if last_sweep.is_none_or(|at| at.elapsed() >= self.config.sweep_interval) {
                if let Err(e) = self.engine.requeue_timed_out(self.sweep_budget()).await {
                    tracing::warn!(error = %e, "Timeout sweep failed");
                }
                last_sweep = Some(Instant::now());
            }

            if let Err(e) = self.fill(&mut running).await {
                tracing::warn!(error = %e, "Polling the task queue failed");
            }

            tokio::select! {
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = record(&mut stats, joined) {
                        tracing::warn!(error = %e, "Recording a task outcome failed");
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!(in_flight = running.len(), "Shutdown requested, waiting for running tasks");
        while let Some(joined) = running.join_next().await {
            if let Err(e) = record(&mut stats, joined) {
                tracing::warn!(error = %e, "Recording a task outcome failed");
            }
        }

        Ok(stats)
    }
}

fn record(
    stats: &mut WorkerStats,
    joined: Result<Result<TaskOutcome, TaskError>, tokio::task::JoinError>,
) -> Result<(), TaskError> {
    match joined {
        Ok(Ok(outcome)) => {
            stats.record(outcome);
            Ok(())
        }
        Ok(Err(e)) => {
            stats.failed += 1;
            Err(e)
        }
        Err(e) => {
            tracing::error!(error = %e, "Sync task panicked");
            stats.failed += 1;
            Ok(())
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("categories", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
