//! Post-creation hooks for cases.
//!
//! Deployments can plug in enrichment that runs after a case is created by
//! escalation (ticket creation, notification fan-out). Hook failures are
//! reported to the caller as workflow errors; the case itself is already
//! committed by the time hooks run.

use async_trait::async_trait;

use crate::models::Case;

/// A plugin invoked after escalation creates a case.
#[async_trait]
pub trait CaseHook: Send + Sync {
    /// Hook name for logging.
    fn name(&self) -> &str;

    /// Called once per created case, after commit.
    async fn on_case_created(&self, case: &Case) -> Result<(), String>;
}

/// Default hook that does nothing.
pub struct NoopHook;

#[async_trait]
impl CaseHook for NoopHook {
    fn name(&self) -> &str {
        "noop"
    }

    async fn on_case_created(&self, _case: &Case) -> Result<(), String> {
        Ok(())
    }
}
