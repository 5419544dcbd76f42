//! Status registry lookups.
//!
//! Alert and task statuses are registry rows rather than enums so that a
//! deployment can rename or extend them. Workflow code resolves the names
//! it needs through this repository.

use async_trait::async_trait;

use super::{DbError, DbPool};
use crate::models::StatusEntry;

/// Repository trait for the status registries.
#[async_trait]
pub trait StatusRepository: Send + Sync {
    /// Resolves an alert status by name.
    async fn alert_status_by_name(&self, name: &str) -> Result<Option<StatusEntry>, DbError>;

    /// Resolves an alert status by ID.
    async fn alert_status(&self, id: i64) -> Result<Option<StatusEntry>, DbError>;

    /// All alert statuses, ordered by ID.
    async fn list_alert_statuses(&self) -> Result<Vec<StatusEntry>, DbError>;

    /// Resolves a task status by name.
    async fn task_status_by_name(&self, name: &str) -> Result<Option<StatusEntry>, DbError>;

    /// Resolves a task status by ID.
    async fn task_status(&self, id: i64) -> Result<Option<StatusEntry>, DbError>;

    /// All task statuses, ordered by ID.
    async fn list_task_statuses(&self) -> Result<Vec<StatusEntry>, DbError>;
}

/// SQLite implementation of StatusRepository.
pub struct SqliteStatusRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteStatusRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    async fn by_name(&self, table: &str, name: &str) -> Result<Option<StatusEntry>, DbError> {
        let row: Option<(i64, String)> =
            sqlx::query_as(&format!("SELECT id, name FROM {table} WHERE name = ?"))
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, name)| StatusEntry { id, name }))
    }

    async fn by_id(&self, table: &str, id: i64) -> Result<Option<StatusEntry>, DbError> {
        let row: Option<(i64, String)> =
            sqlx::query_as(&format!("SELECT id, name FROM {table} WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, name)| StatusEntry { id, name }))
    }

    async fn list(&self, table: &str) -> Result<Vec<StatusEntry>, DbError> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as(&format!("SELECT id, name FROM {table} ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| StatusEntry { id, name })
            .collect())
    }
}

#[async_trait]
impl StatusRepository for SqliteStatusRepository {
    async fn alert_status_by_name(&self, name: &str) -> Result<Option<StatusEntry>, DbError> {
        self.by_name("alert_statuses", name).await
    }

    async fn alert_status(&self, id: i64) -> Result<Option<StatusEntry>, DbError> {
        self.by_id("alert_statuses", id).await
    }

    async fn list_alert_statuses(&self) -> Result<Vec<StatusEntry>, DbError> {
        self.list("alert_statuses").await
    }

    async fn task_status_by_name(&self, name: &str) -> Result<Option<StatusEntry>, DbError> {
        self.by_name("task_statuses", name).await
    }

    async fn task_status(&self, id: i64) -> Result<Option<StatusEntry>, DbError> {
        self.by_id("task_statuses", id).await
    }

    async fn list_task_statuses(&self) -> Result<Vec<StatusEntry>, DbError> {
        self.list("task_statuses").await
    }
}

/// Factory function to create the status repository.
pub fn create_status_repository(pool: &DbPool) -> Box<dyn StatusRepository> {
    Box::new(SqliteStatusRepository::new(pool.sqlite().clone()))
}
