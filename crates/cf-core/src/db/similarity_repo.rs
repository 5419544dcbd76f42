//! Similarity cache for related-alert lookups.
//!
//! IOC and asset values are denormalized into a flat table at alert
//! creation time so that "what else mentions this artifact" is a single
//! indexed query instead of a scan over JSON columns.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use super::{DbError, DbPool};
use crate::models::Alert;

/// Kind of cached artifact value.
pub mod kind {
    pub const IOC: &str = "ioc";
    pub const ASSET: &str = "asset";
}

/// One related alert plus the artifacts it shares with the probe alert.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedAlert {
    pub alert_id: i64,
    pub shared_values: Vec<String>,
}

/// Repository trait for the similarity cache.
#[async_trait]
pub trait SimilarityRepository: Send + Sync {
    /// Indexes an alert's IOC and asset values. Replaces any previous
    /// entries for the alert.
    async fn index_alert(&self, alert: &Alert) -> Result<(), DbError>;

    /// Drops an alert's cache entries.
    async fn remove_alert(&self, alert_id: i64) -> Result<(), DbError>;

    /// Alerts of the same customer sharing at least one artifact value
    /// with the given alert, the alert itself excluded.
    async fn related_alerts(&self, alert: &Alert, limit: u32) -> Result<Vec<RelatedAlert>, DbError>;
}

/// SQLite implementation of SimilarityRepository.
pub struct SqliteSimilarityRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteSimilarityRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SimilarityRepository for SqliteSimilarityRepository {
    async fn index_alert(&self, alert: &Alert) -> Result<(), DbError> {
        self.remove_alert(alert.id).await?;

        let now = Utc::now().to_rfc3339();

        for ioc in &alert.iocs {
            sqlx::query(
                "INSERT INTO similarity_cache (alert_id, customer_id, kind, value, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(alert.id)
            .bind(alert.customer_id)
            .bind(kind::IOC)
            .bind(&ioc.value)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        }

        for asset in &alert.assets {
            sqlx::query(
                "INSERT INTO similarity_cache (alert_id, customer_id, kind, value, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(alert.id)
            .bind(alert.customer_id)
            .bind(kind::ASSET)
            .bind(&asset.name)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn remove_alert(&self, alert_id: i64) -> Result<(), DbError> {
        sqlx::query("DELETE FROM similarity_cache WHERE alert_id = ?")
            .bind(alert_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn related_alerts(&self, alert: &Alert, limit: u32) -> Result<Vec<RelatedAlert>, DbError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT other.alert_id, other.value
            FROM similarity_cache probe
            JOIN similarity_cache other
              ON other.kind = probe.kind
             AND other.value = probe.value
             AND other.customer_id = probe.customer_id
            WHERE probe.alert_id = ?
              AND other.alert_id != ?
            ORDER BY other.alert_id
            "#,
        )
        .bind(alert.id)
        .bind(alert.id)
        .fetch_all(&self.pool)
        .await?;

        let mut related: Vec<RelatedAlert> = Vec::new();
        for (alert_id, value) in rows {
            match related.last_mut() {
                Some(last) if last.alert_id == alert_id => last.shared_values.push(value),
                _ => {
                    if related.len() as u32 >= limit {
                        break;
                    }
                    related.push(RelatedAlert {
                        alert_id,
                        shared_values: vec![value],
                    });
                }
            }
        }

        Ok(related)
    }
}

/// Factory function to create the similarity repository.
pub fn create_similarity_repository(pool: &DbPool) -> Box<dyn SimilarityRepository> {
    Box::new(SqliteSimilarityRepository::new(pool.sqlite().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        create_alert_repository, create_pool, create_status_repository, run_migrations,
        seed_defaults,
    };
    use crate::models::{alert_status, Ioc, NewAlert, Severity};

    async fn setup() -> (DbPool, i64) {
        let url = format!(
            "sqlite:file:test_similarity_{}?mode=memory&cache=shared",
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
        (pool, new.id)
    }

    fn with_ioc(status_id: i64, customer_id: i64, value: &str) -> NewAlert {
        NewAlert {
            title: "alert".to_string(),
            severity: Severity::Low,
            status_id,
            customer_id,
            iocs: vec![Ioc {
                value: value.to_string(),
                ioc_type: "ip".to_string(),
                description: None,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_shared_ioc_links_alerts() {
        let (pool, status_id) = setup().await;
        let alerts = create_alert_repository(&pool);
        let repo = create_similarity_repository(&pool);

        let a = alerts.create(&with_ioc(status_id, 1, "1.2.3.4")).await.unwrap();
        let b = alerts.create(&with_ioc(status_id, 1, "1.2.3.4")).await.unwrap();
        let unrelated = alerts.create(&with_ioc(status_id, 1, "5.6.7.8")).await.unwrap();

        repo.index_alert(&a).await.unwrap();
        repo.index_alert(&b).await.unwrap();
        repo.index_alert(&unrelated).await.unwrap();

        let related = repo.related_alerts(&a, 10).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].alert_id, b.id);
        assert_eq!(related[0].shared_values, vec!["1.2.3.4".to_string()]);
    }

    #[tokio::test]
    async fn test_similarity_is_customer_scoped() {
        let (pool, status_id) = setup().await;
        let alerts = create_alert_repository(&pool);
        let repo = create_similarity_repository(&pool);

        let a = alerts.create(&with_ioc(status_id, 1, "1.2.3.4")).await.unwrap();
        let other_customer = alerts.create(&with_ioc(status_id, 2, "1.2.3.4")).await.unwrap();

        repo.index_alert(&a).await.unwrap();
        repo.index_alert(&other_customer).await.unwrap();

        assert!(repo.related_alerts(&a, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reindex_replaces_entries() {
        let (pool, status_id) = setup().await;
        let alerts = create_alert_repository(&pool);
        let repo = create_similarity_repository(&pool);

        let a = alerts.create(&with_ioc(status_id, 1, "1.2.3.4")).await.unwrap();
        let b = alerts.create(&with_ioc(status_id, 1, "1.2.3.4")).await.unwrap();

        repo.index_alert(&a).await.unwrap();
        repo.index_alert(&b).await.unwrap();

        // Drop the shared IOC from a and reindex.
        let mut a = a;
        a.iocs.clear();
        repo.index_alert(&a).await.unwrap();

        assert!(repo.related_alerts(&b, 10).await.unwrap().is_empty());
    }
}
