//! Database connection pool management.

use super::DbError;
use std::time::Duration;

/// Escapes special characters in a search pattern for use in SQL LIKE
/// clauses, so user input matches literally.
///
/// - `%` -> `\%`
/// - `_` -> `\_`
/// - `\` -> `\\`
pub fn escape_like_pattern(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '%' | '_' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Creates a LIKE pattern that matches anywhere in the string.
pub fn make_like_pattern(search: &str) -> String {
    format!("%{}%", escape_like_pattern(search))
}

/// Database pool handle shared across repositories.
#[derive(Debug, Clone)]
pub struct DbPool {
    inner: sqlx::SqlitePool,
}

/// Options for creating a database connection pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Maximum time to wait for a connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let min_connections = std::env::var("DATABASE_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        let acquire_timeout_secs = std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Self {
            max_connections,
            min_connections,
            acquire_timeout: Duration::from_secs(acquire_timeout_secs),
        }
    }
}

/// Creates a database connection pool from a `sqlite:` URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, DbError> {
    create_pool_with_options(database_url, PoolOptions::default()).await
}

/// Creates a database connection pool with custom options.
pub async fn create_pool_with_options(
    database_url: &str,
    options: PoolOptions,
) -> Result<DbPool, DbError> {
    use tracing::info;

    if !database_url.starts_with("sqlite:") {
        return Err(DbError::Configuration(format!(
            "Unsupported database URL scheme. Expected sqlite:, got: {}",
            database_url.split(':').next().unwrap_or("unknown")
        )));
    }

    info!("Creating SQLite connection pool");
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .min_connections(options.min_connections)
        .acquire_timeout(options.acquire_timeout)
        .connect(database_url)
        .await?;

    Ok(DbPool::from_sqlite(pool))
}

impl DbPool {
    /// Wraps an existing sqlx pool (used by tests).
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        Self { inner: pool }
    }

    /// The underlying sqlx pool.
    pub fn sqlite(&self) -> &sqlx::SqlitePool {
        &self.inner
    }

    /// Checks if the database connection is healthy.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.inner).await.is_ok()
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_pattern_no_special() {
        assert_eq!(escape_like_pattern("hello"), "hello");
        assert_eq!(escape_like_pattern(""), "");
    }

    #[test]
    fn test_escape_like_pattern_specials() {
        assert_eq!(escape_like_pattern("100%"), r"100\%");
        assert_eq!(escape_like_pattern("user_name"), r"user\_name");
        assert_eq!(escape_like_pattern(r"c:\path"), r"c:\\path");
    }

    #[test]
    fn test_make_like_pattern() {
        assert_eq!(make_like_pattern("test"), "%test%");
        assert_eq!(make_like_pattern("user_"), r"%user\_%");
    }

    #[tokio::test]
    async fn test_create_pool_rejects_unknown_scheme() {
        let err = create_pool("mysql://nope").await.unwrap_err();
        assert!(matches!(err, DbError::Configuration(_)));
    }
}
