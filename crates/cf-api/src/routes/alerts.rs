//! Alert management endpoints: CRUD, batch operations, and the
//! escalation/merge workflow.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use validator::Validate;

use crate::dto::{
    AlertDetailData, AlertFilterQuery, AlertListData, BatchDeleteAlertsRequest, BatchDeleteData,
    BatchEscalateRequest, BatchMergeRequest, BatchUpdateAlertsRequest, CreateAlertRequest,
    Envelope, MergeAlertRequest, SimilarAlertEntry, SimilaritiesQuery, UnmergeAlertRequest,
    UpdateAlertRequest,
};
use crate::error::{ApiError, ErrorEnvelope};
use crate::routes::{acting_user, comments};
use crate::state::AppState;
use cf_core::db::{
    create_activity_repository, create_alert_repository, create_case_repository,
    create_similarity_repository, create_status_repository, AlertFilter, PaginatedResult,
    Pagination, SortDirection,
};
use cf_core::events::CaseEvent;
use cf_core::models::{alert_status, Alert, AlertUpdate, FieldChange, HistoryEntry, NewAlert, Severity};
use cf_core::workflow::{self, EscalationContext, ImportOptions};

/// Number of related alerts attached to a single-alert fetch.
const RELATED_ALERTS_LIMIT: u32 = 10;

/// Creates alert routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/filter", get(list_alerts))
        .route("/add", post(create_alert))
        .route("/:id", get(get_alert))
        .route("/similarities/:id", get(alert_similarities))
        .route("/update/:id", post(update_alert))
        .route("/delete/:id", post(delete_alert))
        .route("/batch/update", post(batch_update_alerts))
        .route("/batch/delete", post(batch_delete_alerts))
        .route("/escalate/:id", post(escalate_alert))
        .route("/merge/:id", post(merge_alert))
        .route("/unmerge/:id", post(unmerge_alert))
        .route("/batch/merge", post(batch_merge_alerts))
        .route("/batch/escalate", post(batch_escalate_alerts))
        .nest("/:alert_id/comments", comments::routes())
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_severity(s: &str) -> Result<Severity, ApiError> {
    Severity::parse(s).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Invalid severity: {}. Must be one of: info, low, medium, high, critical",
            s
        ))
    })
}

/// Strict comma-separated id parse for endpoints where every token must
/// resolve to an integer.
fn parse_ids_strict(input: &str) -> Result<Vec<i64>, ApiError> {
    workflow::parse_id_list(input)
        .into_iter()
        .map(|(token, parsed)| {
            parsed.ok_or_else(|| ApiError::BadRequest(format!("Invalid alert id '{}'", token)))
        })
        .collect()
}

fn build_alert_update(request: &UpdateAlertRequest) -> Result<AlertUpdate, ApiError> {
    let severity = request.severity.as_deref().map(parse_severity).transpose()?;

    Ok(AlertUpdate {
        title: request.title.clone(),
        description: request.description.clone(),
        source: request.source.clone(),
        tags: request.tags.clone(),
        severity,
        status_id: request.status_id,
        owner_id: request.owner_id,
    })
}

fn describe_changes(alert_id: i64, changes: &[FieldChange]) -> String {
    let detail: Vec<String> = changes
        .iter()
        .map(|c| format!("{}: '{}' -> '{}'", c.field, c.old, c.new))
        .collect();
    format!("Alert #{} updated: {}", alert_id, detail.join("; "))
}

/// Data payload of the update endpoints.
#[derive(Debug, Serialize)]
struct UpdateAlertData {
    alert: Alert,
    changes: Vec<FieldChange>,
}

// ============================================================================
// CRUD handlers
// ============================================================================

/// List alerts with filtering and pagination.
#[utoipa::path(
    get,
    path = "/alerts/filter",
    params(
        ("alert_ids" = Option<String>, Query, description = "Comma-separated alert id list"),
        ("title" = Option<String>, Query, description = "Substring match on title"),
        ("severity" = Option<String>, Query, description = "Severity name"),
        ("status_id" = Option<i64>, Query, description = "Alert status id"),
        ("customer_id" = Option<i64>, Query, description = "Customer id"),
        ("case_id" = Option<i64>, Query, description = "Linked case id"),
        ("sort" = Option<String>, Query, description = "asc or desc on creation time"),
        ("page" = Option<u32>, Query, description = "Page number (1-indexed)"),
        ("per_page" = Option<u32>, Query, description = "Items per page (max 100)")
    ),
    responses(
        (status = 200, description = "Paginated alert listing"),
        (status = 400, description = "Invalid query parameters", body = ErrorEnvelope)
    ),
    tag = "Alerts"
)]
async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertFilterQuery>,
) -> Result<Json<Envelope<AlertListData>>, ApiError> {
    query.validate()?;

    let severity = query.severity.as_deref().map(parse_severity).transpose()?;
    let alert_ids = query
        .alert_ids
        .as_deref()
        .map(parse_ids_strict)
        .transpose()?;

    let filter = AlertFilter {
        alert_ids,
        title: query.title,
        description: query.description,
        source: query.source,
        tags: query.tags,
        status_id: query.status_id,
        severity,
        owner_id: query.owner_id,
        case_id: query.case_id,
        customer_id: query.customer_id,
        start_date: query.start_date,
        end_date: query.end_date,
        sort: query
            .sort
            .as_deref()
            .map(SortDirection::parse)
            .unwrap_or_default(),
    };

    let pagination = Pagination::from_query(query.page, query.per_page);
    let repo = create_alert_repository(&state.db);

    let alerts = repo.list(&filter, &pagination).await?;
    let total = repo.count(&filter).await?;
    let page = PaginatedResult::new(alerts, total, &pagination);

    Ok(Json(Envelope::success(
        "ok",
        AlertListData {
            total: page.total,
            next_page: page.next_page(),
            last_page: page.total_pages,
            current_page: page.page,
            alerts: page.items,
        },
    )))
}

/// Create a new alert.
#[utoipa::path(
    post,
    path = "/alerts/add",
    responses(
        (status = 201, description = "Alert created"),
        (status = 400, description = "Invalid request", body = ErrorEnvelope)
    ),
    tag = "Alerts"
)]
async fn create_alert(
    State(state): State<AppState>,
    Json(request): Json<CreateAlertRequest>,
) -> Result<(StatusCode, Json<Envelope<Alert>>), ApiError> {
    request.validate()?;

    let statuses = create_status_repository(&state.db);
    let status_id = match request.status_id {
        Some(id) => {
            statuses
                .alert_status(id)
                .await?
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown alert status id {}", id)))?;
            id
        }
        None => {
            statuses
                .alert_status_by_name(alert_status::NEW)
                .await?
                .ok_or_else(|| {
                    ApiError::Internal(format!("Status '{}' is not seeded", alert_status::NEW))
                })?
                .id
        }
    };

    let severity = request
        .severity
        .as_deref()
        .map(parse_severity)
        .transpose()?
        .unwrap_or_default();

    let actor = acting_user(&state, None).await?;
    let repo = create_alert_repository(&state.db);

    let mut alert = repo
        .create(&NewAlert {
            title: request.title,
            description: request.description,
            source: request.source,
            tags: request.tags,
            severity,
            status_id,
            owner_id: request.owner_id,
            customer_id: request.customer_id,
            iocs: request.iocs,
            assets: request.assets,
        })
        .await?;

    alert
        .history
        .push(HistoryEntry::new("Alert created", actor.login.clone()));
    let alert = repo.save(&alert).await?;

    create_similarity_repository(&state.db)
        .index_alert(&alert)
        .await?;

    create_activity_repository(&state.db)
        .record(Some(actor.id), None, &format!("Alert #{} created", alert.id))
        .await?;

    // Notification is best-effort.
    state.event_bus.publish(CaseEvent::AlertCreated {
        alert_id: alert.id,
        customer_id: alert.customer_id,
    });

    Ok((
        StatusCode::CREATED,
        Json(Envelope::success("Alert created", alert)),
    ))
}

/// Get a single alert with its related-alert summary.
#[utoipa::path(
    get,
    path = "/alerts/{id}",
    params(("id" = i64, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Alert details"),
        (status = 404, description = "Alert not found", body = ErrorEnvelope)
    ),
    tag = "Alerts"
)]
async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<AlertDetailData>>, ApiError> {
    let repo = create_alert_repository(&state.db);
    let alert = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Alert not found".to_string()))?;

    let related_alerts = create_similarity_repository(&state.db)
        .related_alerts(&alert, RELATED_ALERTS_LIMIT)
        .await?;

    Ok(Json(Envelope::success(
        "ok",
        AlertDetailData {
            alert,
            related_alerts,
        },
    )))
}

/// Related alert details, filterable by open/closed alert and case buckets.
async fn alert_similarities(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<SimilaritiesQuery>,
) -> Result<Json<Envelope<Vec<SimilarAlertEntry>>>, ApiError> {
    let alerts = create_alert_repository(&state.db);
    let cases = create_case_repository(&state.db);
    let statuses = create_status_repository(&state.db);

    let alert = alerts
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Alert not found".to_string()))?;

    let closed_status_id = statuses
        .alert_status_by_name(alert_status::CLOSED)
        .await?
        .map(|s| s.id);

    let limit = query.limit.unwrap_or(15);
    let related = create_similarity_repository(&state.db)
        .related_alerts(&alert, limit)
        .await?;

    let mut entries = Vec::new();
    for rel in related {
        let Some(other) = alerts.get(rel.alert_id).await? else {
            continue;
        };

        let include = match other.case_id {
            Some(case_id) => {
                let closed = match cases.get(case_id).await? {
                    Some(case) => case.closed_at.is_some(),
                    None => false,
                };
                if closed {
                    query.closed_cases
                } else {
                    query.open_cases
                }
            }
            None => {
                if Some(other.status_id) == closed_status_id {
                    query.closed_alerts
                } else {
                    query.open_alerts
                }
            }
        };

        if include {
            entries.push(SimilarAlertEntry {
                alert_id: other.id,
                title: other.title,
                severity: other.severity.to_string(),
                status_id: other.status_id,
                case_id: other.case_id,
                shared_values: rel.shared_values,
            });
        }
    }

    Ok(Json(Envelope::success("ok", entries)))
}

/// Partially update an alert, logging the audited field diff.
async fn update_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateAlertRequest>,
) -> Result<Json<Envelope<UpdateAlertData>>, ApiError> {
    request.validate()?;
    let update = build_alert_update(&request)?;

    let repo = create_alert_repository(&state.db);
    let alert = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Alert not found".to_string()))?;

    let changes = alert.diff_update(&update);
    if changes.is_empty() {
        return Ok(Json(Envelope::success(
            "No changes",
            UpdateAlertData {
                alert,
                changes,
            },
        )));
    }

    let actor = acting_user(&state, None).await?;
    let alert = repo.update(id, &update).await?;

    create_activity_repository(&state.db)
        .record(Some(actor.id), None, &describe_changes(id, &changes))
        .await?;

    Ok(Json(Envelope::success(
        "Alert updated",
        UpdateAlertData { alert, changes },
    )))
}

/// Apply the same partial update to a batch of alerts.
///
/// The whole request fails on the first id that does not resolve.
async fn batch_update_alerts(
    State(state): State<AppState>,
    Json(request): Json<BatchUpdateAlertsRequest>,
) -> Result<Json<Envelope<Vec<Alert>>>, ApiError> {
    request.validate()?;
    let update = build_alert_update(&request.update)?;
    let ids = parse_ids_strict(&request.ids)?;

    let repo = create_alert_repository(&state.db);
    let activity = create_activity_repository(&state.db);
    let actor = acting_user(&state, None).await?;

    let mut updated = Vec::with_capacity(ids.len());
    for id in ids {
        let alert = repo
            .get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Alert with ID {} not found", id)))?;

        let changes = alert.diff_update(&update);
        if changes.is_empty() {
            updated.push(alert);
            continue;
        }

        let alert = repo.update(id, &update).await?;
        activity
            .record(Some(actor.id), None, &describe_changes(id, &changes))
            .await?;
        updated.push(alert);
    }

    Ok(Json(Envelope::success("Alerts updated", updated)))
}

/// Delete a batch of alerts, continuing past failures.
async fn batch_delete_alerts(
    State(state): State<AppState>,
    Json(request): Json<BatchDeleteAlertsRequest>,
) -> Result<Json<Envelope<BatchDeleteData>>, ApiError> {
    request.validate()?;

    let alerts = create_alert_repository(&state.db);
    let similarity = create_similarity_repository(&state.db);

    let mut deleted = Vec::new();
    let mut skipped = Vec::new();

    for (token, parsed) in workflow::parse_id_list(&request.ids) {
        let Some(id) = parsed else {
            skipped.push(token);
            continue;
        };

        similarity.remove_alert(id).await?;
        if alerts.delete(id).await? {
            deleted.push(id);
        } else {
            skipped.push(token);
        }
    }

    Ok(Json(Envelope::success(
        "Batch delete completed",
        BatchDeleteData { deleted, skipped },
    )))
}

/// Delete a single alert along with its similarity cache entries.
#[utoipa::path(
    post,
    path = "/alerts/delete/{id}",
    params(("id" = i64, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Alert deleted"),
        (status = 404, description = "Alert not found", body = ErrorEnvelope)
    ),
    tag = "Alerts"
)]
async fn delete_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    // Cache entries go first so a partial failure cannot leave dangling
    // similarity rows for a deleted alert.
    create_similarity_repository(&state.db)
        .remove_alert(id)
        .await?;

    let deleted = create_alert_repository(&state.db).delete(id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Alert not found".to_string()));
    }

    let actor = acting_user(&state, None).await?;
    create_activity_repository(&state.db)
        .record(Some(actor.id), None, &format!("Alert #{} deleted", id))
        .await?;

    Ok(Json(Envelope::success(
        "Alert deleted",
        serde_json::json!({ "alert_id": id }),
    )))
}

// ============================================================================
// Workflow handlers
// ============================================================================

macro_rules! with_escalation_ctx {
    ($state:expr, $actor:expr, |$ctx:ident| $body:expr) => {{
        let alerts = create_alert_repository(&$state.db);
        let cases = create_case_repository(&$state.db);
        let statuses = create_status_repository(&$state.db);
        let activity = create_activity_repository(&$state.db);

        let $ctx = EscalationContext {
            alerts: &*alerts,
            cases: &*cases,
            statuses: &*statuses,
            activity: &*activity,
            events: &$state.event_bus,
            hook: &*$state.hook,
            actor: $actor.login.clone(),
            actor_id: Some($actor.id),
        };

        $body
    }};
}

/// Escalate an alert into a new case.
async fn escalate_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(options): Json<ImportOptions>,
) -> Result<Json<Envelope<cf_core::models::Case>>, ApiError> {
    let actor = acting_user(&state, None).await?;
    let case = with_escalation_ctx!(state, actor, |ctx| {
        workflow::escalate(&ctx, id, &options).await
    })?;

    Ok(Json(Envelope::success("Alert escalated", case)))
}

/// Merge an alert into an existing case.
async fn merge_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<MergeAlertRequest>,
) -> Result<Json<Envelope<cf_core::models::Case>>, ApiError> {
    let actor = acting_user(&state, None).await?;
    let case = with_escalation_ctx!(state, actor, |ctx| {
        workflow::merge(&ctx, id, request.target_case_id, &request.import).await
    })?;

    Ok(Json(Envelope::success("Alert merged", case)))
}

/// Detach a previously merged alert from its case.
async fn unmerge_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UnmergeAlertRequest>,
) -> Result<Json<Envelope<Alert>>, ApiError> {
    let actor = acting_user(&state, None).await?;
    let outcome = with_escalation_ctx!(state, actor, |ctx| {
        workflow::unmerge(&ctx, id, request.target_case_id).await
    })?;

    if !outcome.success {
        return Err(ApiError::BadRequest(outcome.message));
    }

    Ok(Json(Envelope::success(outcome.message, outcome.alert)))
}

/// Merge a comma-separated batch of alerts into an existing case.
async fn batch_merge_alerts(
    State(state): State<AppState>,
    Json(request): Json<BatchMergeRequest>,
) -> Result<Json<Envelope<workflow::BatchResult>>, ApiError> {
    let actor = acting_user(&state, None).await?;
    let result = with_escalation_ctx!(state, actor, |ctx| {
        workflow::batch_merge(&ctx, &request.alert_ids, request.target_case_id, &request.import)
            .await
    })?;

    Ok(Json(Envelope::success("Batch merge completed", result)))
}

/// Escalate a comma-separated batch of alerts into one new case.
async fn batch_escalate_alerts(
    State(state): State<AppState>,
    Json(request): Json<BatchEscalateRequest>,
) -> Result<Json<Envelope<workflow::BatchResult>>, ApiError> {
    let actor = acting_user(&state, None).await?;
    let result = with_escalation_ctx!(state, actor, |ctx| {
        workflow::batch_escalate(&ctx, &request.alert_ids, &request.import).await
    })?;

    Ok(Json(Envelope::success("Batch escalation completed", result)))
}
