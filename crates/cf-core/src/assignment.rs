//! Assignee reconciliation for case tasks.
//!
//! Replaces a task's assignee set with a desired set using minimal
//! mutations: only the members entering or leaving the set touch the
//! database. Unknown user ids are skipped rather than failing the whole
//! operation, and reported back to the caller.

use std::collections::BTreeSet;

use tracing::debug;

use crate::db::{DbError, TaskRepository, UserRepository};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AssignmentDelta {
    /// User ids newly assigned.
    pub added: Vec<i64>,
    /// User ids unassigned.
    pub removed: Vec<i64>,
    /// Desired ids that match no existing user and were ignored.
    pub skipped_missing_users: Vec<i64>,
}

impl AssignmentDelta {
    /// True when the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Normalizes a JSON identifier (integer or integer-like string) to i64.
pub fn normalize_user_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Replaces a task's assignee set with `desired`.
///
/// The task must exist. Ids in `desired` that do not resolve to a user
/// are collected into `skipped_missing_users` instead of being created.
/// Applying the same desired set twice yields an empty second delta.
pub async fn reconcile_assignees(
    tasks: &dyn TaskRepository,
    users: &dyn UserRepository,
    task_id: i64,
    desired: &[i64],
) -> Result<AssignmentDelta, DbError> {
    if tasks.get(task_id).await?.is_none() {
        return Err(DbError::not_found("Task", task_id));
    }

    let current: BTreeSet<i64> = tasks.assignee_ids(task_id).await?.into_iter().collect();
    let desired: BTreeSet<i64> = desired.iter().copied().collect();

    let to_add: Vec<i64> = desired.difference(&current).copied().collect();
    let to_remove: Vec<i64> = current.difference(&desired).copied().collect();

    let existing: BTreeSet<i64> = users.filter_existing(&to_add).await?.into_iter().collect();

    let mut delta = AssignmentDelta::default();

    for user_id in to_add {
        if existing.contains(&user_id) {
            tasks.add_assignee(task_id, user_id).await?;
            delta.added.push(user_id);
        } else {
            delta.skipped_missing_users.push(user_id);
        }
    }

    for user_id in to_remove {
        tasks.remove_assignee(task_id, user_id).await?;
        delta.removed.push(user_id);
    }

    debug!(
        task_id,
        added = delta.added.len(),
        removed = delta.removed.len(),
        skipped = delta.skipped_missing_users.len(),
        "Reconciled task assignees"
    );

    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        create_case_repository, create_pool, create_status_repository, create_task_repository,
        create_user_repository, run_migrations, seed_defaults, DbPool,
    };
    use crate::models::{task_status, NewCase, NewTask};

    struct Ctx {
        pool: DbPool,
        task_id: i64,
        user_a: i64,
        user_b: i64,
    }

    async fn setup() -> Ctx {
        let url = format!(
            "sqlite:file:test_assignment_{}?mode=memory&cache=shared",
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
        let a = users.create("a", "A").await.unwrap();
        let b = users.create("b", "B").await.unwrap();

        let statuses = create_status_repository(&pool);
        let todo = statuses
            .task_status_by_name(task_status::TODO)
            .await
            .unwrap()
            .unwrap();

        let tasks = create_task_repository(&pool);
        let task = tasks
            .create(
                case.id,
                &NewTask {
                    title: "task".to_string(),
                    status_id: todo.id,
                    ..Default::default()
                },
                a.id,
            )
            .await
            .unwrap();

        Ctx {
            pool,
            task_id: task.id,
            user_a: a.id,
            user_b: b.id,
        }
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let ctx = setup().await;
        let tasks = create_task_repository(&ctx.pool);
        let users = create_user_repository(&ctx.pool);

        let desired = vec![ctx.user_a, ctx.user_b];
        let first = reconcile_assignees(&*tasks, &*users, ctx.task_id, &desired)
            .await
            .unwrap();
        assert_eq!(first.added.len(), 2);

        let second = reconcile_assignees(&*tasks, &*users, ctx.task_id, &desired)
            .await
            .unwrap();
        assert!(second.is_noop());

        let assigned = tasks.assignee_ids(ctx.task_id).await.unwrap();
        assert_eq!(assigned, vec![ctx.user_a, ctx.user_b]);
    }

    #[tokio::test]
    async fn test_reconcile_minimal_mutations() {
        let ctx = setup().await;
        let tasks = create_task_repository(&ctx.pool);
        let users = create_user_repository(&ctx.pool);

        reconcile_assignees(&*tasks, &*users, ctx.task_id, &[ctx.user_a])
            .await
            .unwrap();

        // a -> b: one add, one remove.
        let delta = reconcile_assignees(&*tasks, &*users, ctx.task_id, &[ctx.user_b])
            .await
            .unwrap();
        assert_eq!(delta.added, vec![ctx.user_b]);
        assert_eq!(delta.removed, vec![ctx.user_a]);
    }

    #[tokio::test]
    async fn test_reconcile_skips_missing_users() {
        let ctx = setup().await;
        let tasks = create_task_repository(&ctx.pool);
        let users = create_user_repository(&ctx.pool);

        let delta = reconcile_assignees(&*tasks, &*users, ctx.task_id, &[ctx.user_a, 9999])
            .await
            .unwrap();
        assert_eq!(delta.added, vec![ctx.user_a]);
        assert_eq!(delta.skipped_missing_users, vec![9999]);

        let assigned = tasks.assignee_ids(ctx.task_id).await.unwrap();
        assert_eq!(assigned, vec![ctx.user_a]);
    }

    #[tokio::test]
    async fn test_reconcile_missing_task_fails() {
        let ctx = setup().await;
        let tasks = create_task_repository(&ctx.pool);
        let users = create_user_repository(&ctx.pool);

        let err = reconcile_assignees(&*tasks, &*users, 424242, &[ctx.user_a])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn test_normalize_user_id() {
        assert_eq!(normalize_user_id(&serde_json::json!(5)), Some(5));
        assert_eq!(normalize_user_id(&serde_json::json!("7")), Some(7));
        assert_eq!(normalize_user_id(&serde_json::json!(" 9 ")), Some(9));
        assert_eq!(normalize_user_id(&serde_json::json!("x")), None);
        assert_eq!(normalize_user_id(&serde_json::json!(null)), None);
        assert_eq!(normalize_user_id(&serde_json::json!(1.5)), None);
    }
}
