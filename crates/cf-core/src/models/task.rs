//! Case task model: a trackable unit of work within a case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted case task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseTask {
    pub id: i64,
    pub case_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    /// Foreign key into the task status registry.
    pub status_id: i64,
    /// Per-deployment attribute bag, defaulted at creation.
    pub custom_attributes: serde_json::Value,
    pub open_date: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub opened_by: i64,
    pub updated_by: i64,
}

/// Fields for creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub status_id: i64,
    pub custom_attributes: Option<serde_json::Value>,
}

/// Default custom attributes merged into every new task.
pub fn default_custom_attributes() -> serde_json::Value {
    serde_json::json!({})
}

/// Task listing row joined with its status name.
#[derive(Debug, Clone, Serialize)]
pub struct TaskListRow {
    pub task_id: i64,
    pub task_title: String,
    pub task_description: Option<String>,
    pub task_tags: Option<String>,
    pub task_open_date: DateTime<Utc>,
    pub task_status_id: i64,
    pub status_name: String,
}

/// Assignee summary attached to a task detail response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssigneeInfo {
    pub id: i64,
    pub login: String,
    pub name: String,
}

/// Aggregate task state kept on the owning case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseTaskState {
    pub open_tasks: u32,
    pub closed_tasks: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_default() {
        let state = CaseTaskState::default();
        assert_eq!(state.open_tasks, 0);
        assert_eq!(state.closed_tasks, 0);
    }

    #[test]
    fn test_task_state_serialization() {
        let state = CaseTaskState {
            open_tasks: 3,
            closed_tasks: 1,
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"open_tasks\":3"));
        let back: CaseTaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
