//! Status registries and object history entries.
//!
//! Alert and task lifecycle states live in lookup tables and are resolved
//! by name, so workflow code never hard-codes a numeric status id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert status names seeded into the registry.
pub mod alert_status {
    pub const NEW: &str = "New";
    pub const ASSIGNED: &str = "Assigned";
    pub const IN_PROGRESS: &str = "In progress";
    pub const PENDING: &str = "Pending";
    pub const CLOSED: &str = "Closed";
    pub const MERGED: &str = "Merged";
    pub const ESCALATED: &str = "Escalated";

    pub const ALL: &[&str] = &[
        NEW, ASSIGNED, IN_PROGRESS, PENDING, CLOSED, MERGED, ESCALATED,
    ];
}

/// Task status names seeded into the registry.
pub mod task_status {
    pub const TODO: &str = "To do";
    pub const IN_PROGRESS: &str = "In progress";
    pub const ON_HOLD: &str = "On hold";
    pub const DONE: &str = "Done";
    pub const CANCELED: &str = "Canceled";

    pub const ALL: &[&str] = &[TODO, IN_PROGRESS, ON_HOLD, DONE, CANCELED];

    /// Statuses that count as closed for the aggregate case task state.
    pub const CLOSED: &[&str] = &[DONE, CANCELED];
}

/// A row in one of the status registries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub id: i64,
    pub name: String,
}

/// One entry in an object's modification history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// What happened, e.g. "created" or "Alert created".
    pub entry: String,
    /// Who did it (login or "system").
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(entry: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            actor: actor.into(),
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registries_contain_workflow_states() {
        assert!(alert_status::ALL.contains(&alert_status::ESCALATED));
        assert!(alert_status::ALL.contains(&alert_status::MERGED));
        assert!(task_status::CLOSED.contains(&task_status::DONE));
        assert!(!task_status::CLOSED.contains(&task_status::TODO));
    }

    #[test]
    fn test_history_entry_new() {
        let entry = HistoryEntry::new("created", "admin");
        assert_eq!(entry.entry, "created");
        assert_eq!(entry.actor, "admin");
    }
}
