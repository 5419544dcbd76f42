//! Alert model: an inbound security event awaiting triage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::HistoryEntry;

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Plain string used in the database column.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parses a severity from its database/API string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Indicator of Compromise attached to an alert or imported into a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ioc {
    pub value: String,
    #[serde(default = "default_ioc_type")]
    pub ioc_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_ioc_type() -> String {
    "other".to_string()
}

/// Asset (host, account, service) referenced by an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(default = "default_asset_type")]
    pub asset_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_asset_type() -> String {
    "other".to_string()
}

/// A persisted alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub source: Option<String>,
    /// Comma-separated tag list, kept as entered.
    pub tags: Option<String>,
    pub severity: Severity,
    /// Foreign key into the alert status registry.
    pub status_id: i64,
    pub owner_id: Option<i64>,
    /// Customer/tenant the alert belongs to.
    pub customer_id: i64,
    /// Case this alert was merged or escalated into, if any.
    pub case_id: Option<i64>,
    pub iocs: Vec<Ioc>,
    pub assets: Vec<Asset>,
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating an alert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAlert {
    pub title: String,
    pub description: Option<String>,
    pub source: Option<String>,
    pub tags: Option<String>,
    pub severity: Severity,
    pub status_id: i64,
    pub owner_id: Option<i64>,
    pub customer_id: i64,
    pub iocs: Vec<Ioc>,
    pub assets: Vec<Asset>,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Low
    }
}

/// Partial update applied to an alert. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct AlertUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub tags: Option<String>,
    pub severity: Option<Severity>,
    pub status_id: Option<i64>,
    pub owner_id: Option<i64>,
}

/// A single audited field change, `{field, old, new}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

impl Alert {
    /// Computes the audited differences an update would introduce.
    ///
    /// Only the explicit auditable field list is diffed; unset update
    /// fields and no-op changes produce no entry.
    pub fn diff_update(&self, update: &AlertUpdate) -> Vec<FieldChange> {
        let mut changes = Vec::new();

        fn push(changes: &mut Vec<FieldChange>, field: &'static str, old: String, new: String) {
            if old != new {
                changes.push(FieldChange { field, old, new });
            }
        }

        if let Some(title) = &update.title {
            push(&mut changes, "title", self.title.clone(), title.clone());
        }
        if let Some(description) = &update.description {
            push(
                &mut changes,
                "description",
                self.description.clone().unwrap_or_default(),
                description.clone(),
            );
        }
        if let Some(source) = &update.source {
            push(
                &mut changes,
                "source",
                self.source.clone().unwrap_or_default(),
                source.clone(),
            );
        }
        if let Some(tags) = &update.tags {
            push(
                &mut changes,
                "tags",
                self.tags.clone().unwrap_or_default(),
                tags.clone(),
            );
        }
        if let Some(severity) = &update.severity {
            push(
                &mut changes,
                "severity",
                self.severity.to_string(),
                severity.to_string(),
            );
        }
        if let Some(status_id) = &update.status_id {
            push(
                &mut changes,
                "status_id",
                self.status_id.to_string(),
                status_id.to_string(),
            );
        }
        if let Some(owner_id) = &update.owner_id {
            push(
                &mut changes,
                "owner_id",
                self.owner_id.map(|o| o.to_string()).unwrap_or_default(),
                owner_id.to_string(),
            );
        }

        changes
    }

    /// True if the update changes nothing.
    pub fn update_is_noop(&self, update: &AlertUpdate) -> bool {
        self.diff_update(update).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_alert() -> Alert {
        Alert {
            id: 1,
            title: "Suspicious login".to_string(),
            description: Some("Login from unusual location".to_string()),
            source: Some("siem".to_string()),
            tags: Some("auth,geo".to_string()),
            severity: Severity::Medium,
            status_id: 1,
            owner_id: None,
            customer_id: 1,
            case_id: None,
            iocs: vec![],
            assets: vec![],
            history: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_severity_parse_roundtrip() {
        for s in ["info", "low", "medium", "high", "critical"] {
            let sev = Severity::parse(s).unwrap();
            assert_eq!(sev.as_db_str(), s);
        }
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse("bogus"), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_diff_update_reports_changes() {
        let alert = sample_alert();
        let update = AlertUpdate {
            title: Some("Confirmed intrusion".to_string()),
            severity: Some(Severity::High),
            ..Default::default()
        };

        let changes = alert.diff_update(&update);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "title");
        assert_eq!(changes[0].old, "Suspicious login");
        assert_eq!(changes[0].new, "Confirmed intrusion");
        assert_eq!(changes[1].field, "severity");
        assert_eq!(changes[1].new, "high");
    }

    #[test]
    fn test_diff_update_ignores_noop_fields() {
        let alert = sample_alert();
        let update = AlertUpdate {
            title: Some(alert.title.clone()),
            ..Default::default()
        };
        assert!(alert.update_is_noop(&update));
    }

    #[test]
    fn test_ioc_defaults_on_deserialize() {
        let ioc: Ioc = serde_json::from_str(r#"{"value": "1.2.3.4"}"#).unwrap();
        assert_eq!(ioc.ioc_type, "other");
        assert!(ioc.description.is_none());
    }
}
