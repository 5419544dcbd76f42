//! Request/response DTOs shared across route modules.
//!
//! Every response body is the uniform envelope
//! `{"status": "success"|"error", "message": ..., "data": ...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use cf_core::db::RelatedAlert;
use cf_core::models::{Alert, Asset, CaseTask, Ioc, TaskAssigneeInfo};
use cf_core::workflow::ImportOptions;

/// Uniform success envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Always "success" for this type; failures go through `ApiError`.
    pub status: String,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }
}

// ============================================================================
// Alerts
// ============================================================================

/// Query parameters for the alert listing endpoint.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct AlertFilterQuery {
    /// Comma-separated alert id list, e.g. "5,7,9".
    pub alert_ids: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub tags: Option<String>,
    pub status_id: Option<i64>,
    pub severity: Option<String>,
    pub owner_id: Option<i64>,
    pub case_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// "asc" or "desc" on creation time.
    pub sort: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<u32>,
}

/// Request body for creating an alert.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAlertRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    pub source: Option<String>,
    pub tags: Option<String>,
    /// Severity name; defaults to "low".
    pub severity: Option<String>,
    /// Status registry id; defaults to the "New" status.
    pub status_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub customer_id: i64,
    #[serde(default)]
    pub iocs: Vec<Ioc>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// Request body for a partial alert update.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAlertRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub tags: Option<String>,
    pub severity: Option<String>,
    pub status_id: Option<i64>,
    pub owner_id: Option<i64>,
}

/// Request body for updating several alerts at once.
#[derive(Debug, Deserialize, Validate)]
pub struct BatchUpdateAlertsRequest {
    /// Comma-separated alert id list.
    #[validate(length(min = 1))]
    pub ids: String,
    #[serde(flatten)]
    pub update: UpdateAlertRequest,
}

/// Request body for deleting several alerts at once.
#[derive(Debug, Deserialize, Validate)]
pub struct BatchDeleteAlertsRequest {
    /// Comma-separated alert id list.
    #[validate(length(min = 1))]
    pub ids: String,
}

/// Request body for merging an alert into an existing case.
#[derive(Debug, Deserialize)]
pub struct MergeAlertRequest {
    pub target_case_id: i64,
    #[serde(flatten)]
    pub import: ImportOptions,
}

/// Request body for detaching an alert from a case.
#[derive(Debug, Deserialize)]
pub struct UnmergeAlertRequest {
    pub target_case_id: i64,
}

/// Request body for merging a batch of alerts into an existing case.
#[derive(Debug, Deserialize)]
pub struct BatchMergeRequest {
    /// Comma-separated alert id list.
    pub alert_ids: String,
    pub target_case_id: i64,
    #[serde(flatten)]
    pub import: ImportOptions,
}

/// Request body for escalating a batch of alerts into one new case.
#[derive(Debug, Deserialize)]
pub struct BatchEscalateRequest {
    /// Comma-separated alert id list.
    pub alert_ids: String,
    #[serde(flatten)]
    pub import: ImportOptions,
}

/// Request body for adding or editing an alert comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(min = 1, max = 10000))]
    pub text: String,
    /// Author; defaults to the system user.
    pub user_id: Option<i64>,
}

/// Data payload of the alert listing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct AlertListData {
    pub total: u64,
    pub alerts: Vec<Alert>,
    pub last_page: u32,
    pub current_page: u32,
    pub next_page: Option<u32>,
}

/// Data payload of the single-alert endpoint.
#[derive(Debug, Serialize)]
pub struct AlertDetailData {
    #[serde(flatten)]
    pub alert: Alert,
    pub related_alerts: Vec<RelatedAlert>,
}

/// Query toggles for the similarity endpoint.
#[derive(Debug, Deserialize)]
pub struct SimilaritiesQuery {
    #[serde(default = "default_true")]
    pub open_alerts: bool,
    #[serde(default)]
    pub closed_alerts: bool,
    #[serde(default)]
    pub open_cases: bool,
    #[serde(default)]
    pub closed_cases: bool,
    pub limit: Option<u32>,
}

fn default_true() -> bool {
    true
}

/// One entry of the similarity endpoint's data payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct SimilarAlertEntry {
    pub alert_id: i64,
    pub title: String,
    pub severity: String,
    pub status_id: i64,
    pub case_id: Option<i64>,
    pub shared_values: Vec<String>,
}

/// Data payload of the batch delete endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchDeleteData {
    pub deleted: Vec<i64>,
    /// Input tokens that did not resolve to a deletable alert.
    pub skipped: Vec<String>,
}

// ============================================================================
// Tasks
// ============================================================================

/// Request body for creating a case task.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    /// Status registry id; defaults to the "To do" status.
    pub status_id: Option<i64>,
    pub custom_attributes: Option<serde_json::Value>,
    /// Desired assignee user ids, integers or integer-like strings,
    /// reconciled against the current set.
    #[serde(default)]
    pub assignees: Vec<serde_json::Value>,
    /// Acting user; defaults to the system user.
    pub user_id: Option<i64>,
}

/// Request body for updating a case task.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub status_id: Option<i64>,
    pub custom_attributes: Option<serde_json::Value>,
    /// Desired assignee set, integers or integer-like strings; absent
    /// leaves assignees untouched.
    pub assignees: Option<Vec<serde_json::Value>>,
    pub user_id: Option<i64>,
}

/// Data payload of the single-task endpoints.
#[derive(Debug, Serialize)]
pub struct TaskDetailData {
    #[serde(flatten)]
    pub task: CaseTask,
    pub assignees: Vec<TaskAssigneeInfo>,
}

// ============================================================================
// Health
// ============================================================================

/// Health check response payload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthData {
    /// "healthy" or "degraded".
    pub status: String,
    pub database: bool,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_serialization() {
        let env = Envelope::success("done", serde_json::json!({"alert_id": 7}));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "done");
        assert_eq!(json["data"]["alert_id"], 7);
    }

    #[test]
    fn test_merge_request_flattens_import_options() {
        let json = r#"{
            "target_case_id": 3,
            "iocs_import_list": ["1.2.3.4"],
            "note": "related infra",
            "import_as_event": true
        }"#;
        let req: MergeAlertRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.target_case_id, 3);
        assert_eq!(req.import.iocs_import_list, Some(vec!["1.2.3.4".to_string()]));
        assert!(req.import.import_as_event);
    }

    #[test]
    fn test_batch_update_request_flatten() {
        let json = r#"{"ids": "5,7,9", "severity": "high"}"#;
        let req: BatchUpdateAlertsRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.ids, "5,7,9");
        assert_eq!(req.update.severity.as_deref(), Some("high"));
        assert!(req.update.title.is_none());
    }

    #[test]
    fn test_similarities_query_defaults() {
        let q: SimilaritiesQuery = serde_json::from_str("{}").unwrap();
        assert!(q.open_alerts);
        assert!(!q.closed_alerts);
        assert!(!q.open_cases);
        assert!(!q.closed_cases);
    }

    #[test]
    fn test_create_alert_request_minimal() {
        let json = r#"{"title": "Suspicious login", "customer_id": 1}"#;
        let req: CreateAlertRequest = serde_json::from_str(json).unwrap();
        assert!(req.validate().is_ok());
        assert!(req.iocs.is_empty());
        assert!(req.severity.is_none());
    }

    #[test]
    fn test_create_alert_request_rejects_empty_title() {
        let req = CreateAlertRequest {
            title: String::new(),
            description: None,
            source: None,
            tags: None,
            severity: None,
            status_id: None,
            owner_id: None,
            customer_id: 1,
            iocs: vec![],
            assets: vec![],
        };
        assert!(req.validate().is_err());
    }
}
