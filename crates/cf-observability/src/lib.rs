//! # cf-observability
//!
//! Logging infrastructure for Caseflow.

pub mod logging;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
