//! Comments attached to alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment on an alert. `created_at` and `updated_at` are equal until
/// the comment is edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertComment {
    pub id: i64,
    pub alert_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
