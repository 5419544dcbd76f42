//! Case task endpoints, plus the task status registry listing.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::debug;
use validator::Validate;

use crate::dto::{CreateTaskRequest, Envelope, TaskDetailData, UpdateTaskRequest};
use crate::error::ApiError;
use crate::routes::acting_user;
use crate::state::AppState;
use cf_core::assignment::{normalize_user_id, reconcile_assignees};
use cf_core::db::{
    create_case_repository, create_status_repository, create_task_repository,
    create_user_repository, TaskUpdate,
};
use cf_core::models::{task_status, NewTask, StatusEntry, TaskListRow};

/// Creates task routes, nested under `/cases/:case_id/tasks`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/list", get(list_tasks))
        .route("/add", post(create_task))
        .route("/:id", get(get_task))
        .route("/update/:id", post(update_task))
}

/// Creates the status registry routes, nested under `/manage`.
pub fn manage_routes() -> Router<AppState> {
    Router::new().route("/task-status/list", get(list_task_statuses))
}

/// Normalizes a desired assignee list. Ids arrive as integers or
/// integer-like strings; anything else is rejected.
fn normalize_assignees(raw: &[serde_json::Value]) -> Result<Vec<i64>, ApiError> {
    raw.iter()
        .map(|value| {
            normalize_user_id(value)
                .ok_or_else(|| ApiError::BadRequest(format!("Invalid assignee id '{}'", value)))
        })
        .collect()
}

async fn require_case(state: &AppState, case_id: i64) -> Result<(), ApiError> {
    let exists = create_case_repository(&state.db).exists(case_id).await?;
    if exists {
        Ok(())
    } else {
        Err(ApiError::NotFound("Case not found".to_string()))
    }
}

/// Recomputes a case's open/closed task aggregate after a task change.
async fn refresh_tasks_state(state: &AppState, case_id: i64) -> Result<(), ApiError> {
    let tasks = create_task_repository(&state.db);
    let counts = tasks.count_states(case_id).await?;
    create_case_repository(&state.db)
        .set_tasks_state(case_id, &counts)
        .await?;
    debug!(
        case_id,
        open_tasks = counts.open_tasks,
        closed_tasks = counts.closed_tasks,
        "Case task state refreshed"
    );
    Ok(())
}

/// List a case's tasks joined with their status names.
async fn list_tasks(
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
) -> Result<Json<Envelope<Vec<TaskListRow>>>, ApiError> {
    require_case(&state, case_id).await?;

    let tasks = create_task_repository(&state.db)
        .list_for_case(case_id)
        .await?;

    Ok(Json(Envelope::success("ok", tasks)))
}

/// Get a task with its assignee list.
async fn get_task(
    State(state): State<AppState>,
    Path((case_id, id)): Path<(i64, i64)>,
) -> Result<Json<Envelope<TaskDetailData>>, ApiError> {
    let tasks = create_task_repository(&state.db);
    let task = tasks
        .get_for_case(case_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    let assignees = tasks.assignees(id).await?;

    Ok(Json(Envelope::success(
        "ok",
        TaskDetailData { task, assignees },
    )))
}

/// Create a task under a case and reconcile its assignees.
async fn create_task(
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Envelope<TaskDetailData>>), ApiError> {
    request.validate()?;
    let desired = normalize_assignees(&request.assignees)?;
    require_case(&state, case_id).await?;

    let statuses = create_status_repository(&state.db);
    let status_id = match request.status_id {
        Some(id) => {
            statuses
                .task_status(id)
                .await?
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown task status id {}", id)))?;
            id
        }
        None => {
            statuses
                .task_status_by_name(task_status::TODO)
                .await?
                .ok_or_else(|| {
                    ApiError::Internal(format!("Status '{}' is not seeded", task_status::TODO))
                })?
                .id
        }
    };

    let actor = acting_user(&state, request.user_id).await?;
    let tasks = create_task_repository(&state.db);
    let users = create_user_repository(&state.db);

    let task = tasks
        .create(
            case_id,
            &NewTask {
                title: request.title,
                description: request.description,
                tags: request.tags,
                status_id,
                custom_attributes: request.custom_attributes,
            },
            actor.id,
        )
        .await?;

    let delta = reconcile_assignees(&*tasks, &*users, task.id, &desired).await?;
    refresh_tasks_state(&state, case_id).await?;

    let assignees = tasks.assignees(task.id).await?;
    let message = if delta.skipped_missing_users.is_empty() {
        "Task created".to_string()
    } else {
        format!(
            "Task created; {} unknown assignee(s) skipped",
            delta.skipped_missing_users.len()
        )
    };

    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(message, TaskDetailData { task, assignees })),
    ))
}

/// Update a task's fields, status, and assignee set.
async fn update_task(
    State(state): State<AppState>,
    Path((case_id, id)): Path<(i64, i64)>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Json<Envelope<TaskDetailData>>, ApiError> {
    request.validate()?;
    let desired = request
        .assignees
        .as_ref()
        .map(|raw| normalize_assignees(raw))
        .transpose()?;

    let tasks = create_task_repository(&state.db);
    tasks
        .get_for_case(case_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    if let Some(status_id) = request.status_id {
        create_status_repository(&state.db)
            .task_status(status_id)
            .await?
            .ok_or_else(|| {
                ApiError::BadRequest(format!("Unknown task status id {}", status_id))
            })?;
    }

    let actor = acting_user(&state, request.user_id).await?;

    let task = tasks
        .update(
            id,
            &TaskUpdate {
                title: request.title,
                description: request.description,
                tags: request.tags,
                status_id: request.status_id,
                custom_attributes: request.custom_attributes,
            },
            actor.id,
        )
        .await?;

    if let Some(desired) = &desired {
        let users = create_user_repository(&state.db);
        reconcile_assignees(&*tasks, &*users, id, desired).await?;
    }

    refresh_tasks_state(&state, case_id).await?;

    let assignees = tasks.assignees(id).await?;
    Ok(Json(Envelope::success(
        "Task updated",
        TaskDetailData { task, assignees },
    )))
}

/// List the task status registry.
async fn list_task_statuses(
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<StatusEntry>>>, ApiError> {
    let statuses = create_status_repository(&state.db)
        .list_task_statuses()
        .await?;

    Ok(Json(Envelope::success("ok", statuses)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    use crate::routes::test_support::{post_json, test_state};
    use cf_core::models::{AccessGrant, NewCase};

    async fn setup() -> (Router, AppState, i64) {
        let state = test_state().await;
        let router = Router::new()
            .nest("/cases/:case_id/tasks", routes())
            .nest("/manage", manage_routes())
            .with_state(state.clone());

        let case = create_case_repository(&state.db)
            .create(
                &NewCase {
                    name: "investigation".to_string(),
                    ..Default::default()
                },
                &[AccessGrant::default_group()],
            )
            .await
            .unwrap();

        (router, state, case.id)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).expect("Failed to parse response body")
    }

    #[tokio::test]
    async fn test_task_lifecycle_updates_case_state() {
        let (app, state, case_id) = setup().await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/cases/{}/tasks/add", case_id),
                &serde_json::json!({"title": "Collect memory dump"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let task_id = created["data"]["id"].as_i64().unwrap();
        assert_eq!(created["data"]["custom_attributes"], serde_json::json!({}));

        let case = create_case_repository(&state.db)
            .get(case_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(case.tasks_state.open_tasks, 1);
        assert_eq!(case.tasks_state.closed_tasks, 0);

        // Closing the task flips the aggregate.
        let done = create_status_repository(&state.db)
            .task_status_by_name(task_status::DONE)
            .await
            .unwrap()
            .unwrap();
        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/cases/{}/tasks/update/{}", case_id, task_id),
                &serde_json::json!({"status_id": done.id}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let case = create_case_repository(&state.db)
            .get(case_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(case.tasks_state.open_tasks, 0);
        assert_eq!(case.tasks_state.closed_tasks, 1);
    }

    #[tokio::test]
    async fn test_task_assignee_reconciliation() {
        let (app, state, case_id) = setup().await;

        let users = create_user_repository(&state.db);
        let u1 = users.create("analyst1", "Analyst One").await.unwrap();
        let u2 = users.create("analyst2", "Analyst Two").await.unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/cases/{}/tasks/add", case_id),
                &serde_json::json!({
                    "title": "Review proxy logs",
                    "assignees": [u1.id, 424242]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let task_id = created["data"]["id"].as_i64().unwrap();
        // The unknown assignee is skipped, not fatal.
        assert!(created["message"]
            .as_str()
            .unwrap()
            .contains("unknown assignee"));
        assert_eq!(created["data"]["assignees"].as_array().unwrap().len(), 1);

        // Swapping the desired set removes u1 and adds u2.
        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/cases/{}/tasks/update/{}", case_id, task_id),
                &serde_json::json!({"assignees": [u2.id]}),
            ))
            .await
            .unwrap();
        let updated = body_json(response).await;
        let assignees = updated["data"]["assignees"].as_array().unwrap();
        assert_eq!(assignees.len(), 1);
        assert_eq!(assignees[0]["login"], "analyst2");
    }

    #[tokio::test]
    async fn test_task_assignees_accept_integer_like_strings() {
        let (app, state, case_id) = setup().await;

        let users = create_user_repository(&state.db);
        let u1 = users.create("analyst1", "Analyst One").await.unwrap();
        let u2 = users.create("analyst2", "Analyst Two").await.unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/cases/{}/tasks/add", case_id),
                &serde_json::json!({
                    "title": "Image the workstation",
                    "assignees": [u1.id.to_string()]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let task_id = created["data"]["id"].as_i64().unwrap();
        let assignees = created["data"]["assignees"].as_array().unwrap();
        assert_eq!(assignees.len(), 1);
        assert_eq!(assignees[0]["login"], "analyst1");

        // Mixed integer and string ids normalize to the same set.
        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/cases/{}/tasks/update/{}", case_id, task_id),
                &serde_json::json!({"assignees": [u1.id, u2.id.to_string()]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body_json(response).await;
        assert_eq!(updated["data"]["assignees"].as_array().unwrap().len(), 2);

        // A token that is not integer-like is rejected outright.
        let response = app
            .oneshot(post_json(
                &format!("/cases/{}/tasks/add", case_id),
                &serde_json::json!({"title": "bad assignee", "assignees": ["analyst1"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["status"], "error");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains("Invalid assignee id"));
    }

    #[tokio::test]
    async fn test_list_tasks_ordered_by_status_name() {
        let (app, state, case_id) = setup().await;

        let statuses = create_status_repository(&state.db);
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

        for (title, status_id) in [("open one", todo.id), ("closed one", done.id)] {
            app.clone()
                .oneshot(post_json(
                    &format!("/cases/{}/tasks/add", case_id),
                    &serde_json::json!({"title": title, "status_id": status_id}),
                ))
                .await
                .unwrap();
        }

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/cases/{}/tasks/list", case_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        let rows = json["data"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        // Descending status name puts "To do" before "Done".
        assert_eq!(rows[0]["status_name"], "To do");
        assert_eq!(rows[1]["status_name"], "Done");
    }

    #[tokio::test]
    async fn test_task_scoped_to_case() {
        let (app, state, case_id) = setup().await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/cases/{}/tasks/add", case_id),
                &serde_json::json!({"title": "scoped"}),
            ))
            .await
            .unwrap();
        let task_id = body_json(response).await["data"]["id"].as_i64().unwrap();

        let other = create_case_repository(&state.db)
            .create(
                &NewCase {
                    name: "other".to_string(),
                    ..Default::default()
                },
                &[AccessGrant::default_group()],
            )
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/cases/{}/tasks/{}", other.id, task_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tasks_for_missing_case() {
        let (app, _state, _case_id) = setup().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/cases/424242/tasks/list")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "Case not found");
    }

    #[tokio::test]
    async fn test_list_task_statuses() {
        let (app, _state, _case_id) = setup().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/manage/task-status/list")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let names: Vec<&str> = json["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"To do"));
        assert!(names.contains(&"Done"));
    }
}
