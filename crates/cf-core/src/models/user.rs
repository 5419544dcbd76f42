//! User model.

use serde::{Deserialize, Serialize};

/// A user account, as much of it as the alert/task surface needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub name: String,
    pub active: bool,
}
