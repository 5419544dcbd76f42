//! Activity log repository.
//!
//! Workflow operations record one human-readable line per action so a
//! case page can show who did what.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{DbError, DbPool};

/// One recorded activity line.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub case_id: Option<i64>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Repository trait for the activity log.
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Records an activity line.
    async fn record(
        &self,
        user_id: Option<i64>,
        case_id: Option<i64>,
        description: &str,
    ) -> Result<(), DbError>;

    /// Activity lines for a case, newest first.
    async fn list_for_case(&self, case_id: i64) -> Result<Vec<ActivityEntry>, DbError>;
}

/// SQLite implementation of ActivityRepository.
pub struct SqliteActivityRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteActivityRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepository for SqliteActivityRepository {
    async fn record(
        &self,
        user_id: Option<i64>,
        case_id: Option<i64>,
        description: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO activity_log (user_id, case_id, description, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(case_id)
        .bind(description)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_case(&self, case_id: i64) -> Result<Vec<ActivityEntry>, DbError> {
        let rows: Vec<(i64, Option<i64>, Option<i64>, String, String)> = sqlx::query_as(
            "SELECT id, user_id, case_id, description, created_at FROM activity_log WHERE case_id = ? ORDER BY id DESC",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, user_id, case_id, description, created_at)| {
                Ok(ActivityEntry {
                    id,
                    user_id,
                    case_id,
                    description,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|e| DbError::Serialization(e.to_string()))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }
}

/// Factory function to create the activity repository.
pub fn create_activity_repository(pool: &DbPool) -> Box<dyn ActivityRepository> {
    Box::new(SqliteActivityRepository::new(pool.sqlite().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};

    #[tokio::test]
    async fn test_record_and_list() {
        let url = format!(
            "sqlite:file:test_activity_{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        );
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let repo = create_activity_repository(&pool);
        repo.record(Some(1), Some(7), "Alert 3 merged into case 7")
            .await
            .unwrap();
        repo.record(None, Some(7), "Case task state updated")
            .await
            .unwrap();
        repo.record(Some(1), Some(8), "unrelated").await.unwrap();

        let entries = repo.list_for_case(7).await.unwrap();
        assert_eq!(entries.len(), 2);
        // Newest first.
        assert_eq!(entries[0].description, "Case task state updated");
    }
}
