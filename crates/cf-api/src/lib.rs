//! # cf-api
//!
//! REST API layer for Caseflow: alert triage and escalation, alert
//! comments, and case task endpoints over the `cf-core` domain.

pub mod dto;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{ApiServer, ApiServerConfig};
pub use state::AppState;
