//! Case repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{DbError, DbPool};
use serde::Serialize;

use crate::models::{AccessGrant, Case, CaseTaskState, CaseTimelineEvent, NewCase};

/// Kind of an imported case artifact.
pub mod artifact_kind {
    pub const IOC: &str = "ioc";
    pub const ASSET: &str = "asset";
}

/// An IOC or asset imported into a case, remembering its source alert.
#[derive(Debug, Clone, Serialize)]
pub struct CaseArtifact {
    pub id: i64,
    pub case_id: i64,
    pub alert_id: i64,
    pub kind: String,
    pub value: String,
    pub description: Option<String>,
}

/// Repository trait for case persistence.
#[async_trait]
pub trait CaseRepository: Send + Sync {
    /// Creates a case with the given access-control list.
    async fn create(&self, case: &NewCase, acl: &[AccessGrant]) -> Result<Case, DbError>;

    /// Gets a case by ID.
    async fn get(&self, id: i64) -> Result<Option<Case>, DbError>;

    /// True when the case exists.
    async fn exists(&self, id: i64) -> Result<bool, DbError>;

    /// Replaces the full case row.
    async fn save(&self, case: &Case) -> Result<Case, DbError>;

    /// Persists the task-state aggregate for a case.
    async fn set_tasks_state(&self, id: i64, state: &CaseTaskState) -> Result<(), DbError>;

    /// Appends a timeline event to a case.
    async fn add_timeline_event(
        &self,
        case_id: i64,
        title: &str,
        content: &str,
    ) -> Result<CaseTimelineEvent, DbError>;

    /// Timeline events for a case, oldest first.
    async fn list_timeline(&self, case_id: i64) -> Result<Vec<CaseTimelineEvent>, DbError>;

    /// Records an imported artifact reference on a case.
    async fn add_artifact(
        &self,
        case_id: i64,
        alert_id: i64,
        kind: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<(), DbError>;

    /// Imported artifacts of a case, in import order.
    async fn list_artifacts(&self, case_id: i64) -> Result<Vec<CaseArtifact>, DbError>;

    /// Removes the artifacts a given alert contributed to a case.
    /// Returns the number of removed rows.
    async fn remove_artifacts_for_alert(&self, case_id: i64, alert_id: i64)
        -> Result<u64, DbError>;
}

const CASE_COLUMNS: &str =
    "id, name, description, tags, acl, owner_id, history, tasks_state, closed_at, created_at";

/// SQLite implementation of CaseRepository.
pub struct SqliteCaseRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteCaseRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CaseRepository for SqliteCaseRepository {
    async fn create(&self, case: &NewCase, acl: &[AccessGrant]) -> Result<Case, DbError> {
        let acl_json = serde_json::to_string(acl)?;
        let created_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO cases (name, description, tags, acl, owner_id, history, tasks_state, closed_at, created_at)
            VALUES (?, ?, ?, ?, ?, '[]', '{"open_tasks":0,"closed_tasks":0}', NULL, ?)
            "#,
        )
        .bind(&case.name)
        .bind(&case.description)
        .bind(&case.tags)
        .bind(&acl_json)
        .bind(case.owner_id)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Case", id))
    }

    async fn get(&self, id: i64) -> Result<Option<Case>, DbError> {
        let row: Option<CaseRow> =
            sqlx::query_as(&format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(row.try_into()?)),
            None => Ok(None),
        }
    }

    async fn exists(&self, id: i64) -> Result<bool, DbError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM cases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn save(&self, case: &Case) -> Result<Case, DbError> {
        let acl = serde_json::to_string(&case.acl)?;
        let history = serde_json::to_string(&case.history)?;
        let tasks_state = serde_json::to_string(&case.tasks_state)?;
        let closed_at = case.closed_at.map(|t| t.to_rfc3339());

        let result = sqlx::query(
            r#"
            UPDATE cases SET
                name = ?, description = ?, tags = ?, acl = ?, owner_id = ?,
                history = ?, tasks_state = ?, closed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&case.name)
        .bind(&case.description)
        .bind(&case.tags)
        .bind(&acl)
        .bind(case.owner_id)
        .bind(&history)
        .bind(&tasks_state)
        .bind(&closed_at)
        .bind(case.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Case", case.id));
        }

        Ok(case.clone())
    }

    async fn set_tasks_state(&self, id: i64, state: &CaseTaskState) -> Result<(), DbError> {
        let tasks_state = serde_json::to_string(state)?;

        let result = sqlx::query("UPDATE cases SET tasks_state = ? WHERE id = ?")
            .bind(&tasks_state)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Case", id));
        }
        Ok(())
    }

    async fn add_timeline_event(
        &self,
        case_id: i64,
        title: &str,
        content: &str,
    ) -> Result<CaseTimelineEvent, DbError> {
        let created_at = Utc::now();

        let result = sqlx::query(
            "INSERT INTO case_timeline_events (case_id, title, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(case_id)
        .bind(title)
        .bind(content)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(CaseTimelineEvent {
            id: result.last_insert_rowid(),
            case_id,
            title: title.to_string(),
            content: content.to_string(),
            created_at,
        })
    }

    async fn list_timeline(&self, case_id: i64) -> Result<Vec<CaseTimelineEvent>, DbError> {
        let rows: Vec<TimelineRow> = sqlx::query_as(
            "SELECT id, case_id, title, content, created_at FROM case_timeline_events WHERE case_id = ? ORDER BY id",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn add_artifact(
        &self,
        case_id: i64,
        alert_id: i64,
        kind: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO case_artifacts (case_id, alert_id, kind, value, description, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(case_id)
        .bind(alert_id)
        .bind(kind)
        .bind(value)
        .bind(description)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_artifacts(&self, case_id: i64) -> Result<Vec<CaseArtifact>, DbError> {
        let rows: Vec<(i64, i64, i64, String, String, Option<String>)> = sqlx::query_as(
            "SELECT id, case_id, alert_id, kind, value, description FROM case_artifacts WHERE case_id = ? ORDER BY id",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, case_id, alert_id, kind, value, description)| CaseArtifact {
                id,
                case_id,
                alert_id,
                kind,
                value,
                description,
            })
            .collect())
    }

    async fn remove_artifacts_for_alert(
        &self,
        case_id: i64,
        alert_id: i64,
    ) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM case_artifacts WHERE case_id = ? AND alert_id = ?")
            .bind(case_id)
            .bind(alert_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Factory function to create the case repository.
pub fn create_case_repository(pool: &DbPool) -> Box<dyn CaseRepository> {
    Box::new(SqliteCaseRepository::new(pool.sqlite().clone()))
}

// Helper structs for SQLx row mapping

#[derive(sqlx::FromRow)]
struct CaseRow {
    id: i64,
    name: String,
    description: String,
    tags: Option<String>,
    acl: String,
    owner_id: Option<i64>,
    history: String,
    tasks_state: String,
    closed_at: Option<String>,
    created_at: String,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DbError::Serialization(e.to_string()))
}

impl TryFrom<CaseRow> for Case {
    type Error = DbError;

    fn try_from(row: CaseRow) -> Result<Self, Self::Error> {
        Ok(Case {
            id: row.id,
            name: row.name,
            description: row.description,
            tags: row.tags,
            acl: serde_json::from_str(&row.acl)?,
            owner_id: row.owner_id,
            history: serde_json::from_str(&row.history)?,
            tasks_state: serde_json::from_str(&row.tasks_state)?,
            closed_at: row.closed_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TimelineRow {
    id: i64,
    case_id: i64,
    title: String,
    content: String,
    created_at: String,
}

impl TryFrom<TimelineRow> for CaseTimelineEvent {
    type Error = DbError;

    fn try_from(row: TimelineRow) -> Result<Self, Self::Error> {
        Ok(CaseTimelineEvent {
            id: row.id,
            case_id: row.case_id,
            title: row.title,
            content: row.content,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
