//! Application state shared across handlers.

use std::sync::Arc;

use cf_core::db::DbPool;
use cf_core::events::EventBus;
use cf_core::hooks::{CaseHook, NoopHook};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DbPool>,
    /// Event bus for best-effort notifications.
    pub event_bus: Arc<EventBus>,
    /// Hook invoked after a case is created by escalation.
    pub hook: Arc<dyn CaseHook>,
}

impl AppState {
    /// Creates a new application state with the no-op case hook.
    pub fn new(db: DbPool, event_bus: EventBus) -> Self {
        Self {
            db: Arc::new(db),
            event_bus: Arc::new(event_bus),
            hook: Arc::new(NoopHook),
        }
    }

    /// Replaces the case hook.
    pub fn with_hook(mut self, hook: Arc<dyn CaseHook>) -> Self {
        self.hook = hook;
        self
    }
}
