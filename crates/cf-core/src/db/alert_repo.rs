//! Alert repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::pagination::Pagination;
use super::{DbError, DbPool};
use crate::models::{Alert, AlertUpdate, NewAlert, Severity};

/// Sort direction for alert listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }

    fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Filter criteria for listing alerts.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    /// Restrict to an explicit set of alert IDs.
    pub alert_ids: Option<Vec<i64>>,
    /// Substring match on title.
    pub title: Option<String>,
    /// Substring match on description.
    pub description: Option<String>,
    /// Substring match on source.
    pub source: Option<String>,
    /// Substring match on the comma-separated tag text.
    pub tags: Option<String>,
    /// Filter by status.
    pub status_id: Option<i64>,
    /// Filter by severity.
    pub severity: Option<Severity>,
    /// Filter by owner.
    pub owner_id: Option<i64>,
    /// Filter by linked case.
    pub case_id: Option<i64>,
    /// Filter by customer.
    pub customer_id: Option<i64>,
    /// Filter by minimum created_at timestamp.
    pub start_date: Option<DateTime<Utc>>,
    /// Filter by maximum created_at timestamp.
    pub end_date: Option<DateTime<Utc>>,
    /// Ordering on created_at.
    pub sort: SortDirection,
}

/// Repository trait for alert persistence.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Creates a new alert and returns it with its assigned ID.
    async fn create(&self, alert: &NewAlert) -> Result<Alert, DbError>;

    /// Gets an alert by ID.
    async fn get(&self, id: i64) -> Result<Option<Alert>, DbError>;

    /// Lists alerts matching the filter, paginated.
    async fn list(
        &self,
        filter: &AlertFilter,
        pagination: &Pagination,
    ) -> Result<Vec<Alert>, DbError>;

    /// Counts alerts matching the filter.
    async fn count(&self, filter: &AlertFilter) -> Result<u64, DbError>;

    /// Applies a partial update. Fields left as None are untouched.
    async fn update(&self, id: i64, update: &AlertUpdate) -> Result<Alert, DbError>;

    /// Replaces the full alert row.
    async fn save(&self, alert: &Alert) -> Result<Alert, DbError>;

    /// Deletes an alert. Returns false when no row matched.
    async fn delete(&self, id: i64) -> Result<bool, DbError>;

    /// Sets the alert status.
    async fn set_status(&self, id: i64, status_id: i64) -> Result<(), DbError>;

    /// Links or unlinks the alert to a case.
    async fn set_case(&self, id: i64, case_id: Option<i64>) -> Result<(), DbError>;
}

const ALERT_COLUMNS: &str = "id, title, description, source, tags, severity, status_id, owner_id, customer_id, case_id, iocs, assets, history, created_at";

/// SQLite implementation of AlertRepository.
pub struct SqliteAlertRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteAlertRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

fn push_filter_clauses(query: &mut String, filter: &AlertFilter) {
    if filter.alert_ids.is_some() {
        query.push_str(" AND id IN (SELECT value FROM json_each(?))");
    }
    if filter.title.is_some() {
        query.push_str(" AND title LIKE ? ESCAPE '\\'");
    }
    if filter.description.is_some() {
        query.push_str(" AND description LIKE ? ESCAPE '\\'");
    }
    if filter.source.is_some() {
        query.push_str(" AND source LIKE ? ESCAPE '\\'");
    }
    if filter.tags.is_some() {
        query.push_str(" AND tags LIKE ? ESCAPE '\\'");
    }
    if filter.status_id.is_some() {
        query.push_str(" AND status_id = ?");
    }
    if filter.severity.is_some() {
        query.push_str(" AND severity = ?");
    }
    if filter.owner_id.is_some() {
        query.push_str(" AND owner_id = ?");
    }
    if filter.case_id.is_some() {
        query.push_str(" AND case_id = ?");
    }
    if filter.customer_id.is_some() {
        query.push_str(" AND customer_id = ?");
    }
    if filter.start_date.is_some() {
        query.push_str(" AND created_at >= ?");
    }
    if filter.end_date.is_some() {
        query.push_str(" AND created_at <= ?");
    }
}

macro_rules! bind_filter {
    ($builder:ident, $filter:expr) => {{
        use super::make_like_pattern;

        let mut builder = $builder;
        if let Some(ids) = &$filter.alert_ids {
            builder = builder.bind(serde_json::to_string(ids)?);
        }
        if let Some(title) = &$filter.title {
            builder = builder.bind(make_like_pattern(title));
        }
        if let Some(description) = &$filter.description {
            builder = builder.bind(make_like_pattern(description));
        }
        if let Some(source) = &$filter.source {
            builder = builder.bind(make_like_pattern(source));
        }
        if let Some(tags) = &$filter.tags {
            builder = builder.bind(make_like_pattern(tags));
        }
        if let Some(status_id) = $filter.status_id {
            builder = builder.bind(status_id);
        }
        if let Some(severity) = $filter.severity {
            builder = builder.bind(severity.as_db_str());
        }
        if let Some(owner_id) = $filter.owner_id {
            builder = builder.bind(owner_id);
        }
        if let Some(case_id) = $filter.case_id {
            builder = builder.bind(case_id);
        }
        if let Some(customer_id) = $filter.customer_id {
            builder = builder.bind(customer_id);
        }
        if let Some(start) = &$filter.start_date {
            builder = builder.bind(start.to_rfc3339());
        }
        if let Some(end) = &$filter.end_date {
            builder = builder.bind(end.to_rfc3339());
        }
        builder
    }};
}

#[async_trait]
impl AlertRepository for SqliteAlertRepository {
    async fn create(&self, alert: &NewAlert) -> Result<Alert, DbError> {
        let iocs = serde_json::to_string(&alert.iocs)?;
        let assets = serde_json::to_string(&alert.assets)?;
        let created_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO alerts (title, description, source, tags, severity, status_id, owner_id, customer_id, case_id, iocs, assets, history, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, '[]', ?)
            "#,
        )
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(&alert.source)
        .bind(&alert.tags)
        .bind(alert.severity.as_db_str())
        .bind(alert.status_id)
        .bind(alert.owner_id)
        .bind(alert.customer_id)
        .bind(&iocs)
        .bind(&assets)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Alert", id))
    }

    async fn get(&self, id: i64) -> Result<Option<Alert>, DbError> {
        let row: Option<AlertRow> =
            sqlx::query_as(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(row.try_into()?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        filter: &AlertFilter,
        pagination: &Pagination,
    ) -> Result<Vec<Alert>, DbError> {
        let mut query = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE 1=1");
        push_filter_clauses(&mut query, filter);
        query.push_str(&format!(
            " ORDER BY created_at {} LIMIT ? OFFSET ?",
            filter.sort.as_sql()
        ));

        let builder = sqlx::query_as::<_, AlertRow>(&query);
        let builder = bind_filter!(builder, filter)
            .bind(pagination.limit() as i64)
            .bind(pagination.offset() as i64);

        let rows: Vec<AlertRow> = builder.fetch_all(&self.pool).await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn count(&self, filter: &AlertFilter) -> Result<u64, DbError> {
        let mut query = String::from("SELECT COUNT(*) FROM alerts WHERE 1=1");
        push_filter_clauses(&mut query, filter);

        let builder = sqlx::query_scalar::<_, i64>(&query);
        let builder = bind_filter!(builder, filter);

        let count: i64 = builder.fetch_one(&self.pool).await?;

        Ok(count as u64)
    }

    async fn update(&self, id: i64, update: &AlertUpdate) -> Result<Alert, DbError> {
        let mut set_clauses: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(title) = &update.title {
            set_clauses.push("title = ?");
            values.push(title.clone());
        }
        if let Some(description) = &update.description {
            set_clauses.push("description = ?");
            values.push(description.clone());
        }
        if let Some(source) = &update.source {
            set_clauses.push("source = ?");
            values.push(source.clone());
        }
        if let Some(tags) = &update.tags {
            set_clauses.push("tags = ?");
            values.push(tags.clone());
        }
        if let Some(severity) = &update.severity {
            set_clauses.push("severity = ?");
            values.push(severity.as_db_str().to_string());
        }
        if let Some(status_id) = update.status_id {
            set_clauses.push("status_id = ?");
            values.push(status_id.to_string());
        }
        if let Some(owner_id) = update.owner_id {
            set_clauses.push("owner_id = ?");
            values.push(owner_id.to_string());
        }

        if !set_clauses.is_empty() {
            let query = format!("UPDATE alerts SET {} WHERE id = ?", set_clauses.join(", "));

            let mut builder = sqlx::query(&query);
            for value in &values {
                builder = builder.bind(value);
            }
            builder.bind(id).execute(&self.pool).await?;
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Alert", id))
    }

    async fn save(&self, alert: &Alert) -> Result<Alert, DbError> {
        let iocs = serde_json::to_string(&alert.iocs)?;
        let assets = serde_json::to_string(&alert.assets)?;
        let history = serde_json::to_string(&alert.history)?;

        let result = sqlx::query(
            r#"
            UPDATE alerts SET
                title = ?, description = ?, source = ?, tags = ?, severity = ?,
                status_id = ?, owner_id = ?, customer_id = ?, case_id = ?,
                iocs = ?, assets = ?, history = ?
            WHERE id = ?
            "#,
        )
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(&alert.source)
        .bind(&alert.tags)
        .bind(alert.severity.as_db_str())
        .bind(alert.status_id)
        .bind(alert.owner_id)
        .bind(alert.customer_id)
        .bind(alert.case_id)
        .bind(&iocs)
        .bind(&assets)
        .bind(&history)
        .bind(alert.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Alert", alert.id));
        }

        Ok(alert.clone())
    }

    async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_status(&self, id: i64, status_id: i64) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE alerts SET status_id = ? WHERE id = ?")
            .bind(status_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Alert", id));
        }
        Ok(())
    }

    async fn set_case(&self, id: i64, case_id: Option<i64>) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE alerts SET case_id = ? WHERE id = ?")
            .bind(case_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Alert", id));
        }
        Ok(())
    }
}

/// Factory function to create the alert repository.
pub fn create_alert_repository(pool: &DbPool) -> Box<dyn AlertRepository> {
    Box::new(SqliteAlertRepository::new(pool.sqlite().clone()))
}

// Helper struct for SQLx row mapping

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: i64,
    title: String,
    description: Option<String>,
    source: Option<String>,
    tags: Option<String>,
    severity: String,
    status_id: i64,
    owner_id: Option<i64>,
    customer_id: i64,
    case_id: Option<i64>,
    iocs: String,
    assets: String,
    history: String,
    created_at: String,
}

impl TryFrom<AlertRow> for Alert {
    type Error = DbError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let severity = Severity::parse(&row.severity)
            .ok_or_else(|| DbError::Serialization(format!("Unknown severity: {}", row.severity)))?;

        Ok(Alert {
            id: row.id,
            title: row.title,
            description: row.description,
            source: row.source,
            tags: row.tags,
            severity,
            status_id: row.status_id,
            owner_id: row.owner_id,
            customer_id: row.customer_id,
            case_id: row.case_id,
            iocs: serde_json::from_str(&row.iocs)?,
            assets: serde_json::from_str(&row.assets)?,
            history: serde_json::from_str(&row.history)?,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map_err(|e| DbError::Serialization(e.to_string()))?
                .with_timezone(&Utc),
        })
    }
}
