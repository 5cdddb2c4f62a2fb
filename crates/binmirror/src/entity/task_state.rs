//! Lifecycle state of a sync task.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum TaskState {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "done")]
    Done,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl TaskState {
    /// Whether a new enqueue for the category should join this task.
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Processing)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Processing => write!(f, "processing"),
            TaskState::Done => write!(f, "done"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskState::Pending),
            "processing" | "running" => Ok(TaskState::Processing),
            "done" | "complete" => Ok(TaskState::Done),
            "failed" => Ok(TaskState::Failed),
            _ => Err(format!("Unknown task state: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_through_from_str() {
        for state in [
            TaskState::Pending,
            TaskState::Processing,
            TaskState::Done,
            TaskState::Failed,
        ] {
            assert_eq!(state.to_string().parse::<TaskState>().unwrap(), state);
        }
        assert_eq!("running".parse::<TaskState>().unwrap(), TaskState::Processing);
        assert!("bogus".parse::<TaskState>().is_err());
    }

    #[test]
    fn only_pending_and_processing_are_active() {
        assert!(TaskState::Pending.is_active());
        assert!(TaskState::Processing.is_active());
        assert!(!TaskState::Done.is_active());
        assert!(!TaskState::Failed.is_active());
    }
}
