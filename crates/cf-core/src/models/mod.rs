//! Domain models for Caseflow.

pub mod alert;
pub mod case;
pub mod comment;
pub mod status;
pub mod task;
pub mod user;

pub use alert::{Alert, AlertUpdate, Asset, FieldChange, Ioc, NewAlert, Severity};
pub use case::{AccessGrant, AccessLevel, Case, CaseTimelineEvent, NewCase, DEFAULT_ACCESS_GROUP};
pub use comment::AlertComment;
pub use status::{alert_status, task_status, HistoryEntry, StatusEntry};
pub use task::{
    default_custom_attributes, CaseTask, CaseTaskState, NewTask, TaskAssigneeInfo, TaskListRow,
};
pub use user::User;
