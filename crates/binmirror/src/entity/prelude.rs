//! Common re-exports for convenient entity usage.

pub use super::binary::{
    ActiveModel as BinaryActiveModel, Column as BinaryColumn, Entity as Binary,
    Model as BinaryModel, node_id,
};
pub use super::sync_task::{
    ActiveModel as SyncTaskActiveModel, Column as SyncTaskColumn, Entity as SyncTaskEntity,
    Model as SyncTask, task_id,
};
pub use super::task_state::TaskState;
