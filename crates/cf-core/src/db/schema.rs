//! Database schema and migrations.

use tracing::info;

use super::{DbError, DbPool};

/// Runs the schema statements against the pool.
///
/// Statements are idempotent (`CREATE TABLE IF NOT EXISTS`) so this is safe
/// to call on every startup.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("Running SQLite migrations");

    for statement in sql::ALL {
        // raw_sql: each block carries a CREATE TABLE plus its indexes.
        sqlx::raw_sql(statement).execute(pool.sqlite()).await?;
    }

    info!("Migrations completed successfully");
    Ok(())
}

/// SQL statements for creating the schema.
pub mod sql {
    /// SQL to create the users table.
    pub const CREATE_USERS_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            login TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        );
    "#;

    /// SQL to create the alert status registry.
    pub const CREATE_ALERT_STATUSES_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS alert_statuses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );
    "#;

    /// SQL to create the task status registry.
    pub const CREATE_TASK_STATUSES_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS task_statuses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );
    "#;

    /// SQL to create the alerts table.
    ///
    /// Nested collections (iocs, assets, history) are stored as JSON text.
    pub const CREATE_ALERTS_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            source TEXT,
            tags TEXT,
            severity TEXT NOT NULL,
            status_id INTEGER NOT NULL REFERENCES alert_statuses(id),
            owner_id INTEGER REFERENCES users(id),
            customer_id INTEGER NOT NULL,
            case_id INTEGER REFERENCES cases(id),
            iocs TEXT NOT NULL DEFAULT '[]',
            assets TEXT NOT NULL DEFAULT '[]',
            history TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_alerts_status_id ON alerts(status_id);
        CREATE INDEX IF NOT EXISTS idx_alerts_case_id ON alerts(case_id);
        CREATE INDEX IF NOT EXISTS idx_alerts_customer_id ON alerts(customer_id);
        CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at);
    "#;

    /// SQL to create the cases table.
    pub const CREATE_CASES_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS cases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            tags TEXT,
            acl TEXT NOT NULL DEFAULT '[]',
            owner_id INTEGER REFERENCES users(id),
            history TEXT NOT NULL DEFAULT '[]',
            tasks_state TEXT NOT NULL DEFAULT '{"open_tasks":0,"closed_tasks":0}',
            closed_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_cases_owner_id ON cases(owner_id);
        CREATE INDEX IF NOT EXISTS idx_cases_created_at ON cases(created_at);
    "#;

    /// SQL to create the case timeline events table.
    pub const CREATE_CASE_TIMELINE_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS case_timeline_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            case_id INTEGER NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_timeline_case_id ON case_timeline_events(case_id);
    "#;

    /// SQL to create the imported case artifacts table.
    ///
    /// Rows remember which alert an IOC or asset came from so that an
    /// unmerge can remove exactly that alert's contributions.
    pub const CREATE_CASE_ARTIFACTS_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS case_artifacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            case_id INTEGER NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
            alert_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            value TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_case_artifacts_case_id ON case_artifacts(case_id);
        CREATE INDEX IF NOT EXISTS idx_case_artifacts_alert_id ON case_artifacts(alert_id);
    "#;

    /// SQL to create the case tasks table.
    pub const CREATE_CASE_TASKS_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS case_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            case_id INTEGER NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT,
            tags TEXT,
            status_id INTEGER NOT NULL REFERENCES task_statuses(id),
            custom_attributes TEXT NOT NULL DEFAULT '{}',
            open_date TEXT NOT NULL,
            last_update TEXT NOT NULL,
            opened_by INTEGER NOT NULL REFERENCES users(id),
            updated_by INTEGER NOT NULL REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_case_tasks_case_id ON case_tasks(case_id);
        CREATE INDEX IF NOT EXISTS idx_case_tasks_status_id ON case_tasks(status_id);
    "#;

    /// SQL to create the task assignee join table.
    pub const CREATE_TASK_ASSIGNEES_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS task_assignees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL REFERENCES case_tasks(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            UNIQUE(task_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_task_assignees_task_id ON task_assignees(task_id);
    "#;

    /// SQL to create the alert comments table.
    pub const CREATE_ALERT_COMMENTS_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS alert_comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_id INTEGER NOT NULL REFERENCES alerts(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(id),
            text TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_alert_comments_alert_id ON alert_comments(alert_id);
    "#;

    /// SQL to create the similarity cache used by related-alert lookups.
    pub const CREATE_SIMILARITY_CACHE_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS similarity_cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_id INTEGER NOT NULL REFERENCES alerts(id) ON DELETE CASCADE,
            customer_id INTEGER,
            kind TEXT NOT NULL,
            value TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_similarity_value ON similarity_cache(kind, value);
        CREATE INDEX IF NOT EXISTS idx_similarity_alert_id ON similarity_cache(alert_id);
    "#;

    /// SQL to create the activity log table.
    pub const CREATE_ACTIVITY_LOG_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            case_id INTEGER,
            description TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_activity_case_id ON activity_log(case_id);
        CREATE INDEX IF NOT EXISTS idx_activity_created_at ON activity_log(created_at);
    "#;

    /// All schema statements in dependency order.
    pub const ALL: &[&str] = &[
        CREATE_USERS_TABLE,
        CREATE_ALERT_STATUSES_TABLE,
        CREATE_TASK_STATUSES_TABLE,
        CREATE_CASES_TABLE,
        CREATE_ALERTS_TABLE,
        CREATE_CASE_TIMELINE_TABLE,
        CREATE_CASE_ARTIFACTS_TABLE,
        CREATE_CASE_TASKS_TABLE,
        CREATE_TASK_ASSIGNEES_TABLE,
        CREATE_ALERT_COMMENTS_TABLE,
        CREATE_SIMILARITY_CACHE_TABLE,
        CREATE_ACTIVITY_LOG_TABLE,
    ];
}
