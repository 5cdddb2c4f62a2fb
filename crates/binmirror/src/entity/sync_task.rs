//! SyncTask entity - the durable, per-category unit of sync work.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::task_state::TaskState;

/// Namespace for category-derived task IDs.
const TASK_NAMESPACE: Uuid = Uuid::from_u128(0x0b7a_52d3_91c4_4a6e_8f02_35e1_c9d8_6a17);

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_tasks")]
pub struct Model {
    /// UUIDv5 of the category name; one task row per category.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub category: String,

    // ─── Lifecycle ───────────────────────────────────────────────────────────
    pub state: TaskState,
    #[sea_orm(default_value = 0)]
    pub attempts: i32,
    /// Human-readable outcome of the last run.
    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,
    /// Serialized `ResumeHint` from the last complete run.
    #[sea_orm(column_type = "Json", nullable)]
    pub resume_hint: Option<serde_json::Value>,

    // ─── Timestamps ──────────────────────────────────────────────────────────
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub finished_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Task ID for a category.
pub fn task_id(category: &str) -> Uuid {
    Uuid::new_v5(&TASK_NAMESPACE, category.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_is_deterministic_per_category() {
        assert_eq!(task_id("electron"), task_id("electron"));
        assert_ne!(task_id("electron"), task_id("node"));
    }
}
