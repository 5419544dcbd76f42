//! Workflow orchestration for promoting alerts into cases.

mod escalation;

use thiserror::Error;

use crate::db::DbError;

pub use escalation::{
    batch_escalate, batch_merge, escalate, merge, parse_id_list, unmerge, BatchOutcome,
    BatchResult, EscalationContext, ImportOptions, UnmergeOutcome, ALERT_NOT_FOUND, CASE_NOT_FOUND,
    NOTE_HEADER,
};

/// Errors produced by workflow operations.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// A referenced alert or case is absent. The message is surfaced to
    /// the caller verbatim ("Alert not found" / "Target case not found").
    #[error("{0}")]
    NotFound(String),

    /// A lifecycle state the workflow depends on is missing from the
    /// status registry.
    #[error("Status '{0}' missing from registry")]
    MissingStatus(String),

    /// A post-create hook rejected the case.
    #[error("Hook '{name}' failed: {message}")]
    Hook { name: String, message: String },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] DbError),
}

impl WorkflowError {
    /// True when the error should map to a 404-style response.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkflowError::NotFound(_))
            || matches!(self, WorkflowError::Store(DbError::NotFound { .. }))
    }
}
