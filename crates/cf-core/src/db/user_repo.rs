//! User repository for database operations.

use async_trait::async_trait;

use super::{DbError, DbPool};
use crate::models::User;

/// Repository trait for user lookups.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Creates a user.
    async fn create(&self, login: &str, name: &str) -> Result<User, DbError>;

    /// Gets a user by ID.
    async fn get(&self, id: i64) -> Result<Option<User>, DbError>;

    /// Gets a user by login.
    async fn get_by_login(&self, login: &str) -> Result<Option<User>, DbError>;

    /// Returns the subset of the given IDs that exist as users.
    ///
    /// Order of the result follows the users table, not the input.
    async fn filter_existing(&self, ids: &[i64]) -> Result<Vec<i64>, DbError>;

    /// All users, ordered by login.
    async fn list(&self) -> Result<Vec<User>, DbError>;
}

/// SQLite implementation of UserRepository.
pub struct SqliteUserRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, login: &str, name: &str) -> Result<User, DbError> {
        let result = sqlx::query("INSERT INTO users (login, name, active) VALUES (?, ?, 1)")
            .bind(login)
            .bind(name)
            .execute(&self.pool)
            .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))
    }

    async fn get(&self, id: i64) -> Result<Option<User>, DbError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, login, name, active FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Into::into))
    }

    async fn get_by_login(&self, login: &str) -> Result<Option<User>, DbError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, login, name, active FROM users WHERE login = ?")
                .bind(login)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Into::into))
    }

    async fn filter_existing(&self, ids: &[i64]) -> Result<Vec<i64>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids_json = serde_json::to_string(ids)?;
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM users WHERE id IN (SELECT value FROM json_each(?))")
                .bind(ids_json)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list(&self) -> Result<Vec<User>, DbError> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, login, name, active FROM users ORDER BY login")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Factory function to create the user repository.
pub fn create_user_repository(pool: &DbPool) -> Box<dyn UserRepository> {
    Box::new(SqliteUserRepository::new(pool.sqlite().clone()))
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    login: String,
    name: String,
    active: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            login: row.login,
            name: row.name,
            active: row.active != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, seed_defaults};

    async fn test_pool() -> DbPool {
        let url = format!(
            "sqlite:file:test_users_{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        );
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        seed_defaults(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let pool = test_pool().await;
        let repo = create_user_repository(&pool);

        let user = repo.create("analyst1", "First Analyst").await.unwrap();
        assert!(user.active);

        let by_login = repo.get_by_login("analyst1").await.unwrap().unwrap();
        assert_eq!(by_login.id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_login_rejected() {
        let pool = test_pool().await;
        let repo = create_user_repository(&pool);

        repo.create("analyst1", "First").await.unwrap();
        let err = repo.create("analyst1", "Second").await.unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_filter_existing_drops_unknown_ids() {
        let pool = test_pool().await;
        let repo = create_user_repository(&pool);

        let a = repo.create("a", "A").await.unwrap();
        let b = repo.create("b", "B").await.unwrap();

        let existing = repo.filter_existing(&[a.id, 999, b.id, 1000]).await.unwrap();
        assert_eq!(existing.len(), 2);
        assert!(existing.contains(&a.id));
        assert!(existing.contains(&b.id));

        assert!(repo.filter_existing(&[]).await.unwrap().is_empty());
    }
}
