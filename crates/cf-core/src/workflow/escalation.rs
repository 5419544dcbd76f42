//! Escalation and merge: turning alerts into cases.
//!
//! Single-alert escalate creates a new case; merge attaches an alert to
//! an existing one. The batch variants accept a comma-separated id list,
//! skip ids that do not resolve, and report a per-id outcome list.
//!
//! Status transitions are committed independently of case creation, so a
//! failure later in the workflow leaves the alert already transitioned.
//! This mirrors the original behavior and is deliberate (see DESIGN.md).

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::WorkflowError;
use crate::db::{
    artifact_kind, ActivityRepository, AlertRepository, CaseRepository, StatusRepository,
};
use crate::events::{CaseEvent, EventBus};
use crate::hooks::CaseHook;
use crate::models::{alert_status, AccessGrant, Alert, Case, HistoryEntry, NewCase, StatusEntry};

/// NotFound message for a missing alert.
pub const ALERT_NOT_FOUND: &str = "Alert not found";

/// NotFound message for a missing merge target.
pub const CASE_NOT_FOUND: &str = "Target case not found";

/// Markdown header under which an escalation note lands in the case
/// description. Appended exactly once per operation, batch or not.
pub const NOTE_HEADER: &str = "### Escalation note";

/// Options controlling what an escalation or merge imports into the case.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportOptions {
    /// IOC values to import from the alert(s). Absent means none.
    pub iocs_import_list: Option<Vec<String>>,
    /// Asset names to import from the alert(s). Absent means none.
    pub assets_import_list: Option<Vec<String>>,
    /// Free-text note appended to the case description.
    pub note: Option<String>,
    /// Also record imported artifacts as a narrative timeline event.
    #[serde(default)]
    pub import_as_event: bool,
    /// Tags for a case created by escalation. Defaults to the alert's.
    pub case_tags: Option<String>,
    /// Title for a case created by escalation. Defaults to one derived
    /// from the alert.
    pub case_title: Option<String>,
}

/// Everything a workflow operation needs, passed explicitly per request.
pub struct EscalationContext<'a> {
    pub alerts: &'a dyn AlertRepository,
    pub cases: &'a dyn CaseRepository,
    pub statuses: &'a dyn StatusRepository,
    pub activity: &'a dyn ActivityRepository,
    pub events: &'a EventBus,
    pub hook: &'a dyn CaseHook,
    /// Login recorded in history entries.
    pub actor: String,
    /// User id recorded in activity lines, when known.
    pub actor_id: Option<i64>,
}

/// Result of an unmerge attempt. Non-fatal failures come back as
/// `success == false` with a message instead of an error.
#[derive(Debug, Clone, Serialize)]
pub struct UnmergeOutcome {
    pub success: bool,
    pub message: String,
    pub alert: Alert,
}

/// Per-id outcome of a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// The alert was transitioned and attached to the case.
    Processed { alert_id: i64 },
    /// The id was skipped; `id` is the raw input token.
    Skipped { id: String, reason: String },
}

/// A batch operation's case plus its per-id outcomes.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub case: Case,
    pub outcomes: Vec<BatchOutcome>,
}

/// Parses a comma-separated id list ("5" or "5,7,9").
///
/// Returns each non-empty token with its parsed id, `None` when the
/// token is not an integer.
pub fn parse_id_list(input: &str) -> Vec<(String, Option<i64>)> {
    input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| (t.to_string(), t.parse().ok()))
        .collect()
}

async fn resolve_alert_status(
    ctx: &EscalationContext<'_>,
    name: &str,
) -> Result<StatusEntry, WorkflowError> {
    ctx.statuses
        .alert_status_by_name(name)
        .await?
        .ok_or_else(|| WorkflowError::MissingStatus(name.to_string()))
}

/// Sets an alert's status, committing the change on its own, and emits
/// the status-change event.
async fn transition_alert(
    ctx: &EscalationContext<'_>,
    alert: &mut Alert,
    status: &StatusEntry,
) -> Result<(), WorkflowError> {
    let old_status_id = alert.status_id;
    ctx.alerts.set_status(alert.id, status.id).await?;
    alert.status_id = status.id;

    ctx.events.publish(CaseEvent::AlertStatusChanged {
        alert_id: alert.id,
        old_status_id,
        new_status_id: status.id,
    });

    Ok(())
}

/// Copies the selected IOCs and assets of an alert into the case.
async fn import_artifacts(
    ctx: &EscalationContext<'_>,
    case_id: i64,
    alert: &Alert,
    opts: &ImportOptions,
) -> Result<(), WorkflowError> {
    let mut imported: Vec<String> = Vec::new();

    if let Some(wanted) = &opts.iocs_import_list {
        for ioc in alert.iocs.iter().filter(|i| wanted.contains(&i.value)) {
            ctx.cases
                .add_artifact(
                    case_id,
                    alert.id,
                    artifact_kind::IOC,
                    &ioc.value,
                    ioc.description.as_deref(),
                )
                .await?;
            imported.push(format!("IOC {}", ioc.value));
        }
    }

    if let Some(wanted) = &opts.assets_import_list {
        for asset in alert.assets.iter().filter(|a| wanted.contains(&a.name)) {
            ctx.cases
                .add_artifact(
                    case_id,
                    alert.id,
                    artifact_kind::ASSET,
                    &asset.name,
                    asset.description.as_deref(),
                )
                .await?;
            imported.push(format!("asset {}", asset.name));
        }
    }

    if opts.import_as_event && !imported.is_empty() {
        ctx.cases
            .add_timeline_event(
                case_id,
                &format!("Artifacts imported from alert #{}", alert.id),
                &imported.join(", "),
            )
            .await?;
    }

    Ok(())
}

/// Links an alert to its case and records the matching history entry.
async fn link_alert(
    ctx: &EscalationContext<'_>,
    alert: &mut Alert,
    case_id: i64,
    history_entry: String,
) -> Result<(), WorkflowError> {
    alert.case_id = Some(case_id);
    alert
        .history
        .push(HistoryEntry::new(history_entry, ctx.actor.clone()));
    ctx.alerts.save(alert).await?;
    Ok(())
}

/// Creates one case from a batch of already-transitioned alerts,
/// importing artifacts from each, then runs the access-grant / note /
/// history / hook / activity steps.
async fn create_case_from_alerts(
    ctx: &EscalationContext<'_>,
    alerts: &[Alert],
    opts: &ImportOptions,
) -> Result<Case, WorkflowError> {
    let first = alerts
        .first()
        .ok_or_else(|| WorkflowError::NotFound(ALERT_NOT_FOUND.to_string()))?;

    let name = opts
        .case_title
        .clone()
        .unwrap_or_else(|| format!("[ALERT #{}] {}", first.id, first.title));

    let mut description = first.description.clone().unwrap_or_default();
    if let Some(note) = &opts.note {
        if !description.is_empty() {
            description.push_str("\n\n");
        }
        description.push_str(&format!("{NOTE_HEADER}\n\n{note}"));
    }

    let new_case = NewCase {
        name,
        description,
        tags: opts.case_tags.clone().or_else(|| first.tags.clone()),
        owner_id: ctx.actor_id,
    };

    // The default access grant is applied at creation so the case is
    // never observable without it.
    let mut case = ctx
        .cases
        .create(&new_case, &[AccessGrant::default_group()])
        .await?;

    for alert in alerts {
        import_artifacts(ctx, case.id, alert, opts).await?;
    }

    case.history
        .push(HistoryEntry::new("created", ctx.actor.clone()));
    let case = ctx.cases.save(&case).await?;

    ctx.activity
        .record(
            ctx.actor_id,
            Some(case.id),
            &format!("Case created from {} alert(s)", alerts.len()),
        )
        .await?;

    if let Err(message) = ctx.hook.on_case_created(&case).await {
        warn!(case_id = case.id, hook = ctx.hook.name(), %message, "Case hook failed");
        return Err(WorkflowError::Hook {
            name: ctx.hook.name().to_string(),
            message,
        });
    }

    ctx.events.publish(CaseEvent::CaseCreated {
        case_id: case.id,
        from_alert_ids: alerts.iter().map(|a| a.id).collect(),
    });

    Ok(case)
}

/// Appends the escalation note to a case description, once, under the
/// fixed markdown header.
async fn append_note(
    ctx: &EscalationContext<'_>,
    case: &Case,
    note: &str,
) -> Result<Case, WorkflowError> {
    let mut case = case.clone();
    if !case.description.is_empty() {
        case.description.push_str("\n\n");
    }
    case.description.push_str(&format!("{NOTE_HEADER}\n\n{note}"));
    Ok(ctx.cases.save(&case).await?)
}

/// Transitions one alert to Merged and attaches it to an existing case.
/// The note, if any, is the caller's responsibility.
async fn merge_alert_into_case(
    ctx: &EscalationContext<'_>,
    alert: &mut Alert,
    case: &Case,
    opts: &ImportOptions,
) -> Result<(), WorkflowError> {
    let merged = resolve_alert_status(ctx, alert_status::MERGED).await?;
    transition_alert(ctx, alert, &merged).await?;

    import_artifacts(ctx, case.id, alert, opts).await?;
    link_alert(
        ctx,
        alert,
        case.id,
        format!("Alert merged into case #{}", case.id),
    )
    .await?;

    ctx.activity
        .record(
            ctx.actor_id,
            Some(case.id),
            &format!("Alert #{} merged into case", alert.id),
        )
        .await?;

    ctx.events.publish(CaseEvent::AlertMerged {
        alert_id: alert.id,
        case_id: case.id,
    });

    Ok(())
}

/// Escalates one alert into a brand-new case.
///
/// The Escalated status is committed before case creation begins; if
/// creation then fails, the alert stays Escalated.
pub async fn escalate(
    ctx: &EscalationContext<'_>,
    alert_id: i64,
    opts: &ImportOptions,
) -> Result<Case, WorkflowError> {
    let mut alert = ctx
        .alerts
        .get(alert_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(ALERT_NOT_FOUND.to_string()))?;

    let escalated = resolve_alert_status(ctx, alert_status::ESCALATED).await?;
    transition_alert(ctx, &mut alert, &escalated).await?;

    let case = create_case_from_alerts(ctx, std::slice::from_ref(&alert), opts).await?;

    link_alert(
        ctx,
        &mut alert,
        case.id,
        format!("Alert escalated to case #{}", case.id),
    )
    .await?;

    info!(alert_id, case_id = case.id, "Alert escalated");
    Ok(case)
}

/// Merges one alert into an existing case.
pub async fn merge(
    ctx: &EscalationContext<'_>,
    alert_id: i64,
    target_case_id: i64,
    opts: &ImportOptions,
) -> Result<Case, WorkflowError> {
    let mut alert = ctx
        .alerts
        .get(alert_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(ALERT_NOT_FOUND.to_string()))?;

    // Resolve the target before any mutation so a missing case leaves
    // the alert untouched.
    let case = ctx
        .cases
        .get(target_case_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(CASE_NOT_FOUND.to_string()))?;

    merge_alert_into_case(ctx, &mut alert, &case, opts).await?;

    let case = if let Some(note) = &opts.note {
        append_note(ctx, &case, note).await?
    } else {
        case
    };

    info!(alert_id, case_id = case.id, "Alert merged");
    Ok(case)
}

/// Reverses a prior merge.
///
/// An alert that was never merged into the given case is a non-fatal
/// failure: the outcome carries `success == false` and a message. On
/// success the alert's imported artifacts are removed from the case, its
/// case link cleared, and its status restored to New.
pub async fn unmerge(
    ctx: &EscalationContext<'_>,
    alert_id: i64,
    case_id: i64,
) -> Result<UnmergeOutcome, WorkflowError> {
    let mut alert = ctx
        .alerts
        .get(alert_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(ALERT_NOT_FOUND.to_string()))?;

    if !ctx.cases.exists(case_id).await? {
        return Err(WorkflowError::NotFound(CASE_NOT_FOUND.to_string()));
    }

    if alert.case_id != Some(case_id) {
        return Ok(UnmergeOutcome {
            success: false,
            message: "Alert is not merged into this case".to_string(),
            alert,
        });
    }

    let removed = ctx.cases.remove_artifacts_for_alert(case_id, alert_id).await?;

    let new_status = resolve_alert_status(ctx, alert_status::NEW).await?;
    transition_alert(ctx, &mut alert, &new_status).await?;

    alert.case_id = None;
    alert.history.push(HistoryEntry::new(
        format!("Alert unmerged from case #{case_id}"),
        ctx.actor.clone(),
    ));
    ctx.alerts.save(&alert).await?;

    ctx.activity
        .record(
            ctx.actor_id,
            Some(case_id),
            &format!("Alert #{alert_id} unmerged from case"),
        )
        .await?;

    info!(alert_id, case_id, removed_artifacts = removed, "Alert unmerged");
    Ok(UnmergeOutcome {
        success: true,
        message: "Alert unmerged from case".to_string(),
        alert,
    })
}

/// Merges every resolvable alert in a comma-separated id list into an
/// existing case. Unresolvable ids are skipped and reported; each alert
/// is committed separately, so a late failure does not undo earlier
/// merges. A supplied note lands in the case description exactly once,
/// after the loop.
pub async fn batch_merge(
    ctx: &EscalationContext<'_>,
    alert_ids: &str,
    target_case_id: i64,
    opts: &ImportOptions,
) -> Result<BatchResult, WorkflowError> {
    let case = ctx
        .cases
        .get(target_case_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(CASE_NOT_FOUND.to_string()))?;

    let mut outcomes = Vec::new();

    for (token, parsed) in parse_id_list(alert_ids) {
        let Some(id) = parsed else {
            outcomes.push(BatchOutcome::Skipped {
                id: token,
                reason: "not an integer id".to_string(),
            });
            continue;
        };

        match ctx.alerts.get(id).await? {
            Some(mut alert) => {
                merge_alert_into_case(ctx, &mut alert, &case, opts).await?;
                outcomes.push(BatchOutcome::Processed { alert_id: alert.id });
            }
            None => {
                warn!(alert_id = id, "Skipping unresolvable alert in batch merge");
                outcomes.push(BatchOutcome::Skipped {
                    id: token,
                    reason: ALERT_NOT_FOUND.to_string(),
                });
            }
        }
    }

    let case = if let Some(note) = &opts.note {
        append_note(ctx, &case, note).await?
    } else {
        case
    };

    Ok(BatchResult { case, outcomes })
}

/// Escalates every resolvable alert in a comma-separated id list into
/// exactly one new case.
///
/// Alerts are transitioned to "Merged", not "Escalated". The original
/// system does this for batch escalation and the behavior is kept
/// verbatim (see DESIGN.md).
pub async fn batch_escalate(
    ctx: &EscalationContext<'_>,
    alert_ids: &str,
    opts: &ImportOptions,
) -> Result<BatchResult, WorkflowError> {
    let mut outcomes = Vec::new();
    let mut resolved: Vec<Alert> = Vec::new();

    for (token, parsed) in parse_id_list(alert_ids) {
        let Some(id) = parsed else {
            outcomes.push(BatchOutcome::Skipped {
                id: token,
                reason: "not an integer id".to_string(),
            });
            continue;
        };

        match ctx.alerts.get(id).await? {
            Some(alert) => resolved.push(alert),
            None => {
                warn!(alert_id = id, "Skipping unresolvable alert in batch escalate");
                outcomes.push(BatchOutcome::Skipped {
                    id: token,
                    reason: ALERT_NOT_FOUND.to_string(),
                });
            }
        }
    }

    if resolved.is_empty() {
        return Err(WorkflowError::NotFound(ALERT_NOT_FOUND.to_string()));
    }

    let merged = resolve_alert_status(ctx, alert_status::MERGED).await?;
    for alert in &mut resolved {
        transition_alert(ctx, alert, &merged).await?;
    }

    let case = create_case_from_alerts(ctx, &resolved, opts).await?;

    for alert in &mut resolved {
        link_alert(
            ctx,
            alert,
            case.id,
            format!("Alert escalated to case #{}", case.id),
        )
        .await?;
        outcomes.push(BatchOutcome::Processed { alert_id: alert.id });
    }

    Ok(BatchResult { case, outcomes })
}
