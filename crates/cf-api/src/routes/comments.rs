//! Alert comment endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::dto::{CommentRequest, Envelope};
use crate::error::ApiError;
use crate::routes::acting_user;
use crate::state::AppState;
use cf_core::db::{
    create_activity_repository, create_alert_repository, create_comment_repository,
};
use cf_core::events::CaseEvent;
use cf_core::models::{AlertComment, HistoryEntry};

/// Creates comment routes, nested under `/alerts/:alert_id/comments`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/list", get(list_comments))
        .route("/add", post(create_comment))
        .route("/:com_id", get(get_comment))
        .route("/:com_id/edit", post(edit_comment))
        .route("/:com_id/delete", post(delete_comment))
}

async fn require_alert(
    state: &AppState,
    alert_id: i64,
) -> Result<cf_core::models::Alert, ApiError> {
    create_alert_repository(&state.db)
        .get(alert_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Alert not found".to_string()))
}

/// List an alert's comments, oldest first.
async fn list_comments(
    State(state): State<AppState>,
    Path(alert_id): Path<i64>,
) -> Result<Json<Envelope<Vec<AlertComment>>>, ApiError> {
    require_alert(&state, alert_id).await?;

    let comments = create_comment_repository(&state.db)
        .list_for_alert(alert_id)
        .await?;

    Ok(Json(Envelope::success("ok", comments)))
}

/// Add a comment to an alert.
async fn create_comment(
    State(state): State<AppState>,
    Path(alert_id): Path<i64>,
    Json(request): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Envelope<AlertComment>>), ApiError> {
    request.validate()?;

    let mut alert = require_alert(&state, alert_id).await?;
    let author = acting_user(&state, request.user_id).await?;

    let comment = create_comment_repository(&state.db)
        .create(alert_id, author.id, &request.text)
        .await?;

    let alerts = create_alert_repository(&state.db);
    alert
        .history
        .push(HistoryEntry::new("commented", author.login.clone()));
    alerts.save(&alert).await?;

    create_activity_repository(&state.db)
        .record(
            Some(author.id),
            None,
            &format!("Comment added to alert #{}", alert_id),
        )
        .await?;

    state.event_bus.publish(CaseEvent::CommentAdded {
        alert_id,
        comment_id: comment.id,
    });

    Ok((
        StatusCode::CREATED,
        Json(Envelope::success("Comment added", comment)),
    ))
}

/// Get a single comment, scoped to its alert.
async fn get_comment(
    State(state): State<AppState>,
    Path((alert_id, com_id)): Path<(i64, i64)>,
) -> Result<Json<Envelope<AlertComment>>, ApiError> {
    let comment = create_comment_repository(&state.db)
        .get(alert_id, com_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

    Ok(Json(Envelope::success("ok", comment)))
}

/// Replace a comment's text.
async fn edit_comment(
    State(state): State<AppState>,
    Path((alert_id, com_id)): Path<(i64, i64)>,
    Json(request): Json<CommentRequest>,
) -> Result<Json<Envelope<AlertComment>>, ApiError> {
    request.validate()?;

    let repo = create_comment_repository(&state.db);
    repo.get(alert_id, com_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

    let comment = repo.update(alert_id, com_id, &request.text).await?;

    Ok(Json(Envelope::success("Comment updated", comment)))
}

/// Delete a comment.
async fn delete_comment(
    State(state): State<AppState>,
    Path((alert_id, com_id)): Path<(i64, i64)>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let deleted = create_comment_repository(&state.db)
        .delete(alert_id, com_id)
        .await?;

    if !deleted {
        return Err(ApiError::NotFound("Comment not found".to_string()));
    }

    Ok(Json(Envelope::success(
        "Comment deleted",
        serde_json::json!({ "comment_id": com_id }),
    )))
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
    use cf_core::models::{NewAlert, Severity};

    async fn setup() -> (Router, AppState, i64) {
        let state = test_state().await;
        let router = Router::new()
            .nest("/alerts/:alert_id/comments", routes())
            .with_state(state.clone());

        let statuses = cf_core::db::create_status_repository(&state.db);
        let status_id = statuses
            .alert_status_by_name(cf_core::models::alert_status::NEW)
            .await
            .unwrap()
            .unwrap()
            .id;

        let alert = create_alert_repository(&state.db)
            .create(&NewAlert {
                title: "commented alert".to_string(),
                severity: Severity::Low,
                status_id,
                customer_id: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        (router, state, alert.id)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).expect("Failed to parse response body")
    }

    #[tokio::test]
    async fn test_comment_lifecycle() {
        let (app, _state, alert_id) = setup().await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/alerts/{}/comments/add", alert_id),
                &serde_json::json!({"text": "looks like a false positive"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let com_id = created["data"]["id"].as_i64().unwrap();
        // Fresh comments carry equal timestamps.
        assert_eq!(created["data"]["created_at"], created["data"]["updated_at"]);

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/alerts/{}/comments/{}/edit", alert_id, com_id),
                &serde_json::json!({"text": "confirmed false positive"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let edited = body_json(response).await;
        assert_eq!(edited["data"]["text"], "confirmed false positive");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/alerts/{}/comments/list", alert_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/alerts/{}/comments/{}/delete", alert_id, com_id),
                &serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/alerts/{}/comments/{}", alert_id, com_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_comment_records_alert_history() {
        let (app, state, alert_id) = setup().await;

        app.clone()
            .oneshot(post_json(
                &format!("/alerts/{}/comments/add", alert_id),
                &serde_json::json!({"text": "note"}),
            ))
            .await
            .unwrap();

        let alert = create_alert_repository(&state.db)
            .get(alert_id)
            .await
            .unwrap()
            .unwrap();
        assert!(alert.history.iter().any(|h| h.entry == "commented"));
    }

    #[tokio::test]
    async fn test_comment_on_missing_alert() {
        let (app, _state, _alert_id) = setup().await;

        let response = app
            .oneshot(post_json(
                "/alerts/424242/comments/add",
                &serde_json::json!({"text": "note"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "Alert not found");
    }

    #[tokio::test]
    async fn test_empty_comment_rejected() {
        let (app, _state, alert_id) = setup().await;

        let response = app
            .oneshot(post_json(
                &format!("/alerts/{}/comments/add", alert_id),
                &serde_json::json!({"text": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_comment_scoped_to_alert() {
        let (app, state, alert_id) = setup().await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/alerts/{}/comments/add", alert_id),
                &serde_json::json!({"text": "scoped"}),
            ))
            .await
            .unwrap();
        let com_id = body_json(response).await["data"]["id"].as_i64().unwrap();

        // Another alert id does not reach the comment.
        let statuses = cf_core::db::create_status_repository(&state.db);
        let status_id = statuses
            .alert_status_by_name(cf_core::models::alert_status::NEW)
            .await
            .unwrap()
            .unwrap()
            .id;
        let other = create_alert_repository(&state.db)
            .create(&NewAlert {
                title: "other".to_string(),
                severity: Severity::Low,
                status_id,
                customer_id: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/alerts/{}/comments/{}", other.id, com_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
