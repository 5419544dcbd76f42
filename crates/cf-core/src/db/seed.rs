//! Initial data for a fresh database.

use tracing::info;

use crate::models::{alert_status, task_status};

use super::{DbError, DbPool};

/// Login of the user seeded for unattributed activity.
pub const SYSTEM_USER_LOGIN: &str = "administrator";

/// Populates the status registries and the default user.
///
/// Idempotent: existing rows are left untouched.
pub async fn seed_defaults(pool: &DbPool) -> Result<(), DbError> {
    for name in alert_status::ALL {
        sqlx::query("INSERT OR IGNORE INTO alert_statuses (name) VALUES (?)")
            .bind(name)
            .execute(pool.sqlite())
            .await?;
    }

    for name in task_status::ALL {
        sqlx::query("INSERT OR IGNORE INTO task_statuses (name) VALUES (?)")
            .bind(name)
            .execute(pool.sqlite())
            .await?;
    }

    sqlx::query("INSERT OR IGNORE INTO users (login, name, active) VALUES (?, ?, 1)")
        .bind(SYSTEM_USER_LOGIN)
        .bind("Administrator")
        .execute(pool.sqlite())
        .await?;

    info!("Seeded status registries and default user");
    Ok(())
}
