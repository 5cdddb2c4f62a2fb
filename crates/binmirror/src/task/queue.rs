//! Database-backed task queue sharing the metadata database.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use crate::entity::sync_task::{
    ActiveModel, Column, Entity as SyncTaskEntity, Model as SyncTask, task_id,
};
use crate::entity::task_state::TaskState;
use crate::source::ResumeHint;

use super::{Enqueued, TaskEngine, TaskError};

/// How many candidates a poll tries before giving up on a contended queue.
const CLAIM_ATTEMPTS: usize = 5;

/// [`TaskEngine`] over the `sync_tasks` table.
///
/// Claims are a conditional `UPDATE … WHERE state = 'pending'`, so two
/// workers polling concurrently never both win the same task.
#[derive(Debug, Clone)]
pub struct DbTaskEngine {
    db: Arc<DatabaseConnection>,
}

impl DbTaskEngine {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<SyncTask>, TaskError> {
        Ok(SyncTaskEntity::find_by_id(id).one(self.db.as_ref()).await?)
    }

    /// The task row of `category`, if one was ever created.
    pub async fn find(&self, category: &str) -> Result<Option<SyncTask>, TaskError> {
        self.find_by_id(task_id(category)).await
    }

    /// Every task, sorted by category.
    pub async fn list(&self) -> Result<Vec<SyncTask>, TaskError> {
        Ok(SyncTaskEntity::find()
            .order_by_asc(Column::Category)
            .all(self.db.as_ref())
            .await?)
    }

    async fn require(&self, id: Uuid) -> Result<SyncTask, TaskError> {
        self.find_by_id(id).await?.ok_or(TaskError::NotFound(id))
    }

    /// Turn a zero-row finish into `NotFound` or `ClaimLost`.
    async fn check_claim(&self, claim: &SyncTask, rows_affected: u64) -> Result<(), TaskError> {
        if rows_affected > 0 {
            return Ok(());
        }
        let current = self.require(claim.id).await?;
        tracing::warn!(
            category = %current.category,
            attempt = claim.attempts,
            current_attempt = current.attempts,
            state = %current.state,
            "Sync task was reclaimed, dropping stale result"
        );
        Err(TaskError::ClaimLost {
            id: claim.id,
            attempt: claim.attempts,
        })
    }
}

#[async_trait]
impl TaskEngine for DbTaskEngine {
    async fn create_or_join(&self, category: &str) -> Result<Enqueued, TaskError> {
        let db = self.db.as_ref();
        let id = task_id(category);
        let now = Utc::now().fixed_offset();

        let model = ActiveModel {
            id: Set(id),
            category: Set(category.to_string()),
            state: Set(TaskState::Pending),
            attempts: Set(0),
            note: Set(None),
            resume_hint: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            started_at: Set(None),
            finished_at: Set(None),
        };
        let inserted = SyncTaskEntity::insert(model)
            .on_conflict(OnConflict::column(Column::Id).do_nothing().to_owned())
            .exec_without_returning(db)
            .await?;

        let task = self.require(id).await?;
        if inserted > 0 {
            tracing::debug!(category, task_id = %id, "Created sync task");
            return Ok(Enqueued {
                task,
                joined: false,
            });
        }
        if task.state.is_active() {
            tracing::debug!(category, task_id = %id, state = %task.state, "Joined active sync task");
            return Ok(Enqueued { task, joined: true });
        }

        let reset = SyncTaskEntity::update_many()
            .col_expr(Column::State, Expr::value(TaskState::Pending))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::State.is_in([TaskState::Done, TaskState::Failed]))
            .exec(db)
            .await?;

        let task = self.require(id).await?;
        Ok(Enqueued {
            task,
            joined: reset.rows_affected == 0,
        })
    }

    async fn poll_next_runnable(&self) -> Result<Option<SyncTask>, TaskError> {
        let db = self.db.as_ref();

        for _ in 0..CLAIM_ATTEMPTS {
            let Some(candidate) = SyncTaskEntity::find()
                .filter(Column::State.eq(TaskState::Pending))
                .order_by_asc(Column::UpdatedAt)
                .order_by_asc(Column::Category)
                .one(db)
                .await?
            else {
                return Ok(None);
            };

            let now = Utc::now().fixed_offset();
            let claimed = SyncTaskEntity::update_many()
                .col_expr(Column::State, Expr::value(TaskState::Processing))
                .col_expr(Column::Attempts, Expr::col(Column::Attempts).add(1))
                .col_expr(Column::StartedAt, Expr::value(Some(now)))
                .col_expr(Column::FinishedAt, Expr::value(Option::<chrono::DateTime<chrono::FixedOffset>>::None))
                .col_expr(Column::UpdatedAt, Expr::value(now))
                .filter(Column::Id.eq(candidate.id))
                .filter(Column::State.eq(TaskState::Pending))
                .exec(db)
                .await?;

            if claimed.rows_affected == 1 {
                let task = self.require(candidate.id).await?;
                tracing::debug!(category = %task.category, attempt = task.attempts, "Claimed sync task");
                return Ok(Some(task));
            }
            tracing::debug!(category = %candidate.category, "Lost claim race, retrying");
        }

        Ok(None)
    }

    async fn mark_complete(
        &self,
        claim: &SyncTask,
        hint: Option<&ResumeHint>,
        note: Option<String>,
    ) -> Result<(), TaskError> {
        let now = Utc::now().fixed_offset();
        let mut update = SyncTaskEntity::update_many()
            .col_expr(Column::State, Expr::value(TaskState::Done))
            .col_expr(Column::Note, Expr::value(note))
            .col_expr(Column::FinishedAt, Expr::value(Some(now)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(claim.id))
            .filter(Column::State.eq(TaskState::Processing))
            .filter(Column::Attempts.eq(claim.attempts));
        if let Some(hint) = hint {
            update = update.col_expr(Column::ResumeHint, Expr::value(serde_json::to_value(hint)?));
        }

        let result = update.exec(self.db.as_ref()).await?;
        self.check_claim(claim, result.rows_affected).await
    }

    async fn mark_failed(&self, claim: &SyncTask, error: &str) -> Result<(), TaskError> {
        let now = Utc::now().fixed_offset();
        let result = SyncTaskEntity::update_many()
            .col_expr(Column::State, Expr::value(TaskState::Failed))
            .col_expr(Column::Note, Expr::value(error))
            .col_expr(Column::FinishedAt, Expr::value(Some(now)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(claim.id))
            .filter(Column::State.eq(TaskState::Processing))
            .filter(Column::Attempts.eq(claim.attempts))
            .exec(self.db.as_ref())
            .await?;
        self.check_claim(claim, result.rows_affected).await
    }

    async fn requeue_timed_out(&self, budget: Duration) -> Result<u64, TaskError> {
        let now = Utc::now();
        let cutoff = (now - budget).fixed_offset();
        let result = SyncTaskEntity::update_many()
            .col_expr(Column::State, Expr::value(TaskState::Pending))
            .col_expr(Column::Note, Expr::value("requeued after exceeding the run budget"))
            .col_expr(Column::UpdatedAt, Expr::value(now.fixed_offset()))
            .filter(Column::State.eq(TaskState::Processing))
            .filter(Column::StartedAt.lt(cutoff))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected > 0 {
            tracing::warn!(
                count = result.rows_affected,
                budget_secs = budget.num_seconds(),
                "Requeued timed-out sync tasks"
            );
        }
        Ok(result.rows_affected)
    }
}
