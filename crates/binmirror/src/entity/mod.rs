//! SeaORM entity definitions for the binmirror metadata store.

pub mod binary;
pub mod prelude;
pub mod sync_task;
pub mod task_state;
