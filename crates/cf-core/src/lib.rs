//! Core library for Caseflow, an alert and case management service for
//! incident response teams.
//!
//! This crate holds the domain models, the SQLite persistence layer, the
//! escalation workflow, task assignee reconciliation, the in-process
//! event bus, and the case lifecycle hook seam. The HTTP surface lives
//! in `cf-api`.

pub mod assignment;
pub mod db;
pub mod events;
pub mod hooks;
pub mod models;
pub mod workflow;
