//! Durable per-category sync tasks.
//!
//! A category has at most one task row (its id is derived from the category
//! name), so repeated enqueue requests coalesce onto the same run. Workers
//! claim `pending` tasks atomically; a periodic sweep returns runs stuck in
//! `processing` to `pending`, making execution at-least-once.

use async_trait::async_trait;
use chrono::Duration;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

use crate::entity::sync_task::Model as SyncTask;
use crate::source::ResumeHint;

pub mod queue;
pub mod worker;

pub use queue::DbTaskEngine;
pub use worker::{WorkerConfig, WorkerPool, WorkerStats};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Task not found: {0}")]
    NotFound(Uuid),

    /// The task was requeued or claimed again since this run claimed it.
    #[error("Task {id} is no longer held by attempt {attempt}")]
    ClaimLost { id: Uuid, attempt: i32 },

    #[error("Invalid resume hint: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of [`TaskEngine::create_or_join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    pub task: SyncTask,
    /// `true` when an already pending or running task absorbed the request.
    pub joined: bool,
}

/// Scheduling contract used by workers and the CLI.
#[async_trait]
pub trait TaskEngine: Send + Sync {
    /// Queue a run for `category`, or join the one already queued or running.
    async fn create_or_join(&self, category: &str) -> Result<Enqueued, TaskError>;

    /// Claim the oldest pending task, if any.
    async fn poll_next_runnable(&self) -> Result<Option<SyncTask>, TaskError>;

    /// Finish the run holding `claim`. `hint` replaces the stored resume hint
    /// when given.
    ///
    /// Only the attempt that claimed the task may finish it; a run that was
    /// requeued underneath gets [`TaskError::ClaimLost`].
    async fn mark_complete(
        &self,
        claim: &SyncTask,
        hint: Option<&ResumeHint>,
        note: Option<String>,
    ) -> Result<(), TaskError>;

    /// Fail the run holding `claim`, with the same ownership rule as
    /// [`TaskEngine::mark_complete`].
    async fn mark_failed(&self, claim: &SyncTask, error: &str) -> Result<(), TaskError>;

    /// Return tasks processing for longer than `budget` to pending.
    ///
    /// Returns the number of tasks requeued.
    async fn requeue_timed_out(&self, budget: Duration) -> Result<u64, TaskError>;
}

/// Decode the resume hint stored on `task`.
pub fn resume_hint(task: &SyncTask) -> Result<Option<ResumeHint>, TaskError> {
    task.resume_hint
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(TaskError::from)
}
