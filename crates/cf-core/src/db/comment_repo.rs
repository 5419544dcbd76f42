//! Alert comment repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{DbError, DbPool};
use crate::models::AlertComment;

/// Repository trait for alert comments.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Adds a comment to an alert.
    async fn create(&self, alert_id: i64, user_id: i64, text: &str)
        -> Result<AlertComment, DbError>;

    /// Gets a comment by ID, scoped to its alert.
    async fn get(&self, alert_id: i64, comment_id: i64) -> Result<Option<AlertComment>, DbError>;

    /// A given alert's comments, oldest first.
    async fn list_for_alert(&self, alert_id: i64) -> Result<Vec<AlertComment>, DbError>;

    /// Replaces a comment's text and bumps `updated_at`.
    async fn update(
        &self,
        alert_id: i64,
        comment_id: i64,
        text: &str,
    ) -> Result<AlertComment, DbError>;

    /// Deletes a comment. Returns false when no row matched.
    async fn delete(&self, alert_id: i64, comment_id: i64) -> Result<bool, DbError>;
}

/// SQLite implementation of CommentRepository.
pub struct SqliteCommentRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteCommentRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentRepository for SqliteCommentRepository {
    async fn create(
        &self,
        alert_id: i64,
        user_id: i64,
        text: &str,
    ) -> Result<AlertComment, DbError> {
        // A fresh comment carries identical creation and update times.
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO alert_comments (alert_id, user_id, text, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(alert_id)
        .bind(user_id)
        .bind(text)
        .bind(&now_str)
        .bind(&now_str)
        .execute(&self.pool)
        .await?;

        Ok(AlertComment {
            id: result.last_insert_rowid(),
            alert_id,
            user_id,
            text: text.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, alert_id: i64, comment_id: i64) -> Result<Option<AlertComment>, DbError> {
        let row: Option<CommentRow> = sqlx::query_as(
            "SELECT id, alert_id, user_id, text, created_at, updated_at FROM alert_comments WHERE id = ? AND alert_id = ?",
        )
        .bind(comment_id)
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_into()?)),
            None => Ok(None),
        }
    }

    async fn list_for_alert(&self, alert_id: i64) -> Result<Vec<AlertComment>, DbError> {
        let rows: Vec<CommentRow> = sqlx::query_as(
            "SELECT id, alert_id, user_id, text, created_at, updated_at FROM alert_comments WHERE alert_id = ? ORDER BY created_at, id",
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn update(
        &self,
        alert_id: i64,
        comment_id: i64,
        text: &str,
    ) -> Result<AlertComment, DbError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE alert_comments SET text = ?, updated_at = ? WHERE id = ? AND alert_id = ?",
        )
        .bind(text)
        .bind(&now)
        .bind(comment_id)
        .bind(alert_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Comment", comment_id));
        }

        self.get(alert_id, comment_id)
            .await?
            .ok_or_else(|| DbError::not_found("Comment", comment_id))
    }

    async fn delete(&self, alert_id: i64, comment_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM alert_comments WHERE id = ? AND alert_id = ?")
            .bind(comment_id)
            .bind(alert_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Factory function to create the comment repository.
pub fn create_comment_repository(pool: &DbPool) -> Box<dyn CommentRepository> {
    Box::new(SqliteCommentRepository::new(pool.sqlite().clone()))
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    alert_id: i64,
    user_id: i64,
    text: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<CommentRow> for AlertComment {
    type Error = DbError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        let parse = |s: &str| -> Result<DateTime<Utc>, DbError> {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| DbError::Serialization(e.to_string()))
        };

        Ok(AlertComment {
            id: row.id,
            alert_id: row.alert_id,
            user_id: row.user_id,
            text: row.text,
            created_at: parse(&row.created_at)?,
            updated_at: parse(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        create_alert_repository, create_pool, create_status_repository, create_user_repository,
        run_migrations, seed_defaults,
    };
    use crate::models::{alert_status, NewAlert, Severity};

    async fn setup() -> (DbPool, i64, i64) {
        let url = format!(
            "sqlite:file:test_comments_{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        );
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        seed_defaults(&pool).await.unwrap();

        let statuses = create_status_repository(&pool);
        let new = statuses
            .alert_status_by_name(alert_status::NEW)
            .await
            .unwrap()
            .unwrap();

        let alerts = create_alert_repository(&pool);
        let alert = alerts
            .create(&NewAlert {
                title: "alert".to_string(),
                severity: Severity::Low,
                status_id: new.id,
                customer_id: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        let users = create_user_repository(&pool);
        let user = users.create("analyst1", "Analyst One").await.unwrap();

        (pool, alert.id, user.id)
    }

    #[tokio::test]
    async fn test_create_sets_equal_timestamps() {
        let (pool, alert_id, user_id) = setup().await;
        let repo = create_comment_repository(&pool);

        let comment = repo.create(alert_id, user_id, "first look").await.unwrap();
        assert_eq!(comment.created_at, comment.updated_at);
    }

    #[tokio::test]
    async fn test_list_ordering() {
        let (pool, alert_id, user_id) = setup().await;
        let repo = create_comment_repository(&pool);

        repo.create(alert_id, user_id, "one").await.unwrap();
        repo.create(alert_id, user_id, "two").await.unwrap();

        let comments = repo.list_for_alert(alert_id).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].text, "one");
    }

    #[tokio::test]
    async fn test_update_bumps_updated_at() {
        let (pool, alert_id, user_id) = setup().await;
        let repo = create_comment_repository(&pool);

        let comment = repo.create(alert_id, user_id, "typo").await.unwrap();
        let updated = repo.update(alert_id, comment.id, "fixed").await.unwrap();

        assert_eq!(updated.text, "fixed");
        assert!(updated.updated_at >= updated.created_at);
    }

    #[tokio::test]
    async fn test_get_scoped_to_alert() {
        let (pool, alert_id, user_id) = setup().await;
        let repo = create_comment_repository(&pool);

        let comment = repo.create(alert_id, user_id, "note").await.unwrap();
        assert!(repo.get(alert_id + 1, comment.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let (pool, alert_id, user_id) = setup().await;
        let repo = create_comment_repository(&pool);

        let comment = repo.create(alert_id, user_id, "gone").await.unwrap();
        assert!(repo.delete(alert_id, comment.id).await.unwrap());
        assert!(!repo.delete(alert_id, comment.id).await.unwrap());
    }
}
