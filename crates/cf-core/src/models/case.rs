//! Case model: an investigation container created from escalated alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::HistoryEntry;
use super::task::CaseTaskState;

/// Group receiving access to cases created by escalation.
pub const DEFAULT_ACCESS_GROUP: &str = "analysts";

/// Access level on a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Full,
}

/// One entry of a case's access-control list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub group: String,
    pub level: AccessLevel,
}

impl AccessGrant {
    /// The grant every escalation-created case receives before it is
    /// considered usable.
    pub fn default_group() -> Self {
        Self {
            group: DEFAULT_ACCESS_GROUP.to_string(),
            level: AccessLevel::Full,
        }
    }
}

/// A persisted case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub tags: Option<String>,
    pub acl: Vec<AccessGrant>,
    pub owner_id: Option<i64>,
    pub history: Vec<HistoryEntry>,
    /// Aggregate over the case's tasks, recomputed on task changes.
    pub tasks_state: CaseTaskState,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Case {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// Fields for creating a case.
#[derive(Debug, Clone, Default)]
pub struct NewCase {
    pub name: String,
    pub description: String,
    pub tags: Option<String>,
    pub owner_id: Option<i64>,
}

/// A narrative timeline entry on a case, written when artifacts are
/// imported with `import_as_event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseTimelineEvent {
    pub id: i64,
    pub case_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
