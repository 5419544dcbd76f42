//! Case task repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{DbError, DbPool};
use crate::models::{
    default_custom_attributes, task_status, CaseTask, CaseTaskState, NewTask, TaskAssigneeInfo,
    TaskListRow,
};

/// Partial update applied to a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub status_id: Option<i64>,
    pub custom_attributes: Option<serde_json::Value>,
}

/// Repository trait for case task persistence.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Creates a task under a case. Missing custom attributes default to
    /// the deployment baseline.
    async fn create(&self, case_id: i64, task: &NewTask, opened_by: i64)
        -> Result<CaseTask, DbError>;

    /// Gets a task by ID.
    async fn get(&self, id: i64) -> Result<Option<CaseTask>, DbError>;

    /// Gets a task by ID, scoped to its case.
    async fn get_for_case(&self, case_id: i64, id: i64) -> Result<Option<CaseTask>, DbError>;

    /// Lists a case's tasks joined with their status names.
    async fn list_for_case(&self, case_id: i64) -> Result<Vec<TaskListRow>, DbError>;

    /// Applies a partial update and bumps `last_update`/`updated_by`.
    async fn update(
        &self,
        id: i64,
        update: &TaskUpdate,
        updated_by: i64,
    ) -> Result<CaseTask, DbError>;

    /// Deletes a task along with its assignee rows. Returns false when no
    /// row matched.
    async fn delete(&self, id: i64) -> Result<bool, DbError>;

    /// Computes the open/closed aggregate for a case's tasks.
    async fn count_states(&self, case_id: i64) -> Result<CaseTaskState, DbError>;

    /// Current assignee user IDs of a task.
    async fn assignee_ids(&self, task_id: i64) -> Result<Vec<i64>, DbError>;

    /// Current assignees of a task with user details, ordered by login.
    async fn assignees(&self, task_id: i64) -> Result<Vec<TaskAssigneeInfo>, DbError>;

    /// Adds an assignee to a task. Idempotent.
    async fn add_assignee(&self, task_id: i64, user_id: i64) -> Result<(), DbError>;

    /// Removes an assignee from a task.
    async fn remove_assignee(&self, task_id: i64, user_id: i64) -> Result<(), DbError>;
}

const TASK_COLUMNS: &str = "id, case_id, title, description, tags, status_id, custom_attributes, open_date, last_update, opened_by, updated_by";

/// SQLite implementation of TaskRepository.
pub struct SqliteTaskRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(
        &self,
        case_id: i64,
        task: &NewTask,
        opened_by: i64,
    ) -> Result<CaseTask, DbError> {
        let custom_attributes = task
            .custom_attributes
            .clone()
            .unwrap_or_else(default_custom_attributes);
        let custom_attributes = serde_json::to_string(&custom_attributes)?;
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO case_tasks (case_id, title, description, tags, status_id, custom_attributes, open_date, last_update, opened_by, updated_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(case_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.tags)
        .bind(task.status_id)
        .bind(&custom_attributes)
        .bind(&now)
        .bind(&now)
        .bind(opened_by)
        .bind(opened_by)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Task", id))
    }

    async fn get(&self, id: i64) -> Result<Option<CaseTask>, DbError> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM case_tasks WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(row.try_into()?)),
            None => Ok(None),
        }
    }

    async fn get_for_case(&self, case_id: i64, id: i64) -> Result<Option<CaseTask>, DbError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM case_tasks WHERE id = ? AND case_id = ?"
        ))
        .bind(id)
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_into()?)),
            None => Ok(None),
        }
    }

    async fn list_for_case(&self, case_id: i64) -> Result<Vec<TaskListRow>, DbError> {
        let rows: Vec<TaskListRowRaw> = sqlx::query_as(
            r#"
            SELECT t.id, t.title, t.description, t.tags, t.open_date, t.status_id, s.name AS status_name
            FROM case_tasks t
            JOIN task_statuses s ON s.id = t.status_id
            WHERE t.case_id = ?
            ORDER BY s.name DESC, t.id
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn update(
        &self,
        id: i64,
        update: &TaskUpdate,
        updated_by: i64,
    ) -> Result<CaseTask, DbError> {
        let mut set_clauses = vec!["last_update = ?", "updated_by = ?"];
        let mut values: Vec<String> = vec![Utc::now().to_rfc3339(), updated_by.to_string()];

        if let Some(title) = &update.title {
            set_clauses.push("title = ?");
            values.push(title.clone());
        }
        if let Some(description) = &update.description {
            set_clauses.push("description = ?");
            values.push(description.clone());
        }
        if let Some(tags) = &update.tags {
            set_clauses.push("tags = ?");
            values.push(tags.clone());
        }
        if let Some(status_id) = update.status_id {
            set_clauses.push("status_id = ?");
            values.push(status_id.to_string());
        }
        if let Some(custom_attributes) = &update.custom_attributes {
            set_clauses.push("custom_attributes = ?");
            values.push(serde_json::to_string(custom_attributes)?);
        }

        let query = format!(
            "UPDATE case_tasks SET {} WHERE id = ?",
            set_clauses.join(", ")
        );

        let mut builder = sqlx::query(&query);
        for value in &values {
            builder = builder.bind(value);
        }
        let result = builder.bind(id).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Task", id));
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Task", id))
    }

    async fn delete(&self, id: i64) -> Result<bool, DbError> {
        // Assignee rows go first: SQLite does not enforce cascades unless
        // foreign keys are switched on for the connection.
        sqlx::query("DELETE FROM task_assignees WHERE task_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM case_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_states(&self, case_id: i64) -> Result<CaseTaskState, DbError> {
        let closed_names = serde_json::to_string(task_status::CLOSED)?;

        let (open, closed): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN s.name NOT IN (SELECT value FROM json_each(?)) THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN s.name IN (SELECT value FROM json_each(?)) THEN 1 ELSE 0 END), 0)
            FROM case_tasks t
            JOIN task_statuses s ON s.id = t.status_id
            WHERE t.case_id = ?
            "#,
        )
        .bind(&closed_names)
        .bind(&closed_names)
        .bind(case_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CaseTaskState {
            open_tasks: open as u32,
            closed_tasks: closed as u32,
        })
    }

    async fn assignee_ids(&self, task_id: i64) -> Result<Vec<i64>, DbError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT user_id FROM task_assignees WHERE task_id = ? ORDER BY user_id")
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn assignees(&self, task_id: i64) -> Result<Vec<TaskAssigneeInfo>, DbError> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            r#"
            SELECT u.id, u.login, u.name
            FROM task_assignees a
            JOIN users u ON u.id = a.user_id
            WHERE a.task_id = ?
            ORDER BY u.login
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, login, name)| TaskAssigneeInfo { id, login, name })
            .collect())
    }

    async fn add_assignee(&self, task_id: i64, user_id: i64) -> Result<(), DbError> {
        sqlx::query("INSERT OR IGNORE INTO task_assignees (task_id, user_id) VALUES (?, ?)")
            .bind(task_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_assignee(&self, task_id: i64, user_id: i64) -> Result<(), DbError> {
        sqlx::query("DELETE FROM task_assignees WHERE task_id = ? AND user_id = ?")
            .bind(task_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Factory function to create the task repository.
pub fn create_task_repository(pool: &DbPool) -> Box<dyn TaskRepository> {
    Box::new(SqliteTaskRepository::new(pool.sqlite().clone()))
}

// Helper structs for SQLx row mapping

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    case_id: i64,
    title: String,
    description: Option<String>,
    tags: Option<String>,
    status_id: i64,
    custom_attributes: String,
    open_date: String,
    last_update: String,
    opened_by: i64,
    updated_by: i64,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DbError::Serialization(e.to_string()))
}

impl TryFrom<TaskRow> for CaseTask {
    type Error = DbError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(CaseTask {
            id: row.id,
            case_id: row.case_id,
            title: row.title,
            description: row.description,
            tags: row.tags,
            status_id: row.status_id,
            custom_attributes: serde_json::from_str(&row.custom_attributes)?,
            open_date: parse_timestamp(&row.open_date)?,
            last_update: parse_timestamp(&row.last_update)?,
            opened_by: row.opened_by,
            updated_by: row.updated_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskListRowRaw {
    id: i64,
    title: String,
    description: Option<String>,
    tags: Option<String>,
    open_date: String,
    status_id: i64,
    status_name: String,
}

impl TryFrom<TaskListRowRaw> for TaskListRow {
    type Error = DbError;

    fn try_from(row: TaskListRowRaw) -> Result<Self, Self::Error> {
        Ok(TaskListRow {
            task_id: row.id,
            task_title: row.title,
            task_description: row.description,
            task_tags: row.tags,
            task_open_date: parse_timestamp(&row.open_date)?,
            task_status_id: row.status_id,
            status_name: row.status_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        create_case_repository, create_pool, create_status_repository, create_user_repository,
        run_migrations, seed_defaults,
    };
    use crate::models::NewCase;

    struct TestCtx {
        pool: DbPool,
        case_id: i64,
        user_id: i64,
        todo_id: i64,
        done_id: i64,
    }

    async fn setup() -> TestCtx {
        let url = format!(
            "sqlite:file:test_tasks_{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        );
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        seed_defaults(&pool).await.unwrap();

        let cases = create_case_repository(&pool);
        let case = cases
            .create(
                &NewCase {
                    name: "case".to_string(),
                    ..Default::default()
                },
                &[],
            )
            .await
            .unwrap();

        let users = create_user_repository(&pool);
        let user = users.create("analyst1", "Analyst One").await.unwrap();

        let statuses = create_status_repository(&pool);
        let todo = statuses
            .task_status_by_name(task_status::TODO)
            .await
            .unwrap()
            .unwrap();
        let done = statuses
            .task_status_by_name(task_status::DONE)
            .await
            .unwrap()
            .unwrap();

        TestCtx {
            pool,
            case_id: case.id,
            user_id: user.id,
            todo_id: todo.id,
            done_id: done.id,
        }
    }

    fn sample_task(status_id: i64) -> NewTask {
        NewTask {
            title: "Collect memory image".to_string(),
            description: Some("From host WS-042".to_string()),
            tags: Some("forensics".to_string()),
            status_id,
            custom_attributes: None,
        }
    }

    #[tokio::test]
    async fn test_create_defaults_custom_attributes() {
        let ctx = setup().await;
        let repo = create_task_repository(&ctx.pool);

        let task = repo
            .create(ctx.case_id, &sample_task(ctx.todo_id), ctx.user_id)
            .await
            .unwrap();

        assert_eq!(task.custom_attributes, serde_json::json!({}));
        assert_eq!(task.opened_by, ctx.user_id);
        assert_eq!(task.updated_by, ctx.user_id);
    }

    #[tokio::test]
    async fn test_get_for_case_scoping() {
        let ctx = setup().await;
        let repo = create_task_repository(&ctx.pool);

        let task = repo
            .create(ctx.case_id, &sample_task(ctx.todo_id), ctx.user_id)
            .await
            .unwrap();

        assert!(repo
            .get_for_case(ctx.case_id, task.id)
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .get_for_case(ctx.case_id + 1, task.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_joins_status_name() {
        let ctx = setup().await;
        let repo = create_task_repository(&ctx.pool);

        repo.create(ctx.case_id, &sample_task(ctx.todo_id), ctx.user_id)
            .await
            .unwrap();

        let rows = repo.list_for_case(ctx.case_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status_name, task_status::TODO);
    }

    #[tokio::test]
    async fn test_count_states() {
        let ctx = setup().await;
        let repo = create_task_repository(&ctx.pool);

        repo.create(ctx.case_id, &sample_task(ctx.todo_id), ctx.user_id)
            .await
            .unwrap();
        repo.create(ctx.case_id, &sample_task(ctx.todo_id), ctx.user_id)
            .await
            .unwrap();
        repo.create(ctx.case_id, &sample_task(ctx.done_id), ctx.user_id)
            .await
            .unwrap();

        let state = repo.count_states(ctx.case_id).await.unwrap();
        assert_eq!(state.open_tasks, 2);
        assert_eq!(state.closed_tasks, 1);
    }

    #[tokio::test]
    async fn test_assignees_are_idempotent() {
        let ctx = setup().await;
        let repo = create_task_repository(&ctx.pool);

        let task = repo
            .create(ctx.case_id, &sample_task(ctx.todo_id), ctx.user_id)
            .await
            .unwrap();

        repo.add_assignee(task.id, ctx.user_id).await.unwrap();
        repo.add_assignee(task.id, ctx.user_id).await.unwrap();

        assert_eq!(repo.assignee_ids(task.id).await.unwrap(), vec![ctx.user_id]);

        let infos = repo.assignees(task.id).await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].login, "analyst1");

        repo.remove_assignee(task.id, ctx.user_id).await.unwrap();
        assert!(repo.assignee_ids(task.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_assignee_rows() {
        let ctx = setup().await;
        let repo = create_task_repository(&ctx.pool);

        let task = repo
            .create(ctx.case_id, &sample_task(ctx.todo_id), ctx.user_id)
            .await
            .unwrap();
        repo.add_assignee(task.id, ctx.user_id).await.unwrap();

        assert!(repo.delete(task.id).await.unwrap());
        assert!(repo.get(task.id).await.unwrap().is_none());
        assert!(repo.assignee_ids(task.id).await.unwrap().is_empty());
    }
}
