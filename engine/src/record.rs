//! Resolution records and their archived projection
//!
//! A [`ResolutionRecord`] is the full, immutable result of triaging one
//! incident. A [`LogEntry`] is the flattened subset persisted to the archive.

use crate::gate::GateCheck;
use crate::impact::{round1, round2, Severity};
use crate::incident::{Incident, IssueType};
use crate::playbook::{PlaybookOutcome, StepRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Terminal handling outcome of an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionMode {
    AutoResolved,
    AutoAttempted,
    ManualRequired,
}

impl ResolutionMode {
    pub const ALL: [ResolutionMode; 3] = [
        ResolutionMode::ManualRequired,
        ResolutionMode::AutoAttempted,
        ResolutionMode::AutoResolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoResolved => "AUTO_RESOLVED",
            Self::AutoAttempted => "AUTO_ATTEMPTED",
            Self::ManualRequired => "MANUAL_REQUIRED",
        }
    }

    /// Position in batch output: manual work first, resolved last
    pub fn sort_rank(&self) -> u8 {
        match self {
            Self::ManualRequired => 0,
            Self::AutoAttempted => 1,
            Self::AutoResolved => 2,
        }
    }

    /// Whether a human still has to act
    pub fn needs_human(&self) -> bool {
        !matches!(self, Self::AutoResolved)
    }
}

impl From<PlaybookOutcome> for ResolutionMode {
    fn from(outcome: PlaybookOutcome) -> Self {
        match outcome {
            PlaybookOutcome::Resolved => Self::AutoResolved,
            PlaybookOutcome::AttemptedFailed => Self::AutoAttempted,
            PlaybookOutcome::Skipped => Self::ManualRequired,
        }
    }
}

impl std::fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything decided about one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    #[serde(flatten)]
    pub incident: Incident,
    pub predicted_issue: IssueType,
    pub ml_confidence: f64,
    pub impact_score: f64,
    pub severity: Severity,
    pub recommended_action: String,
    pub sla_minutes: u32,
    pub responsible_team: String,
    pub escalation_status: String,
    pub is_escalated: bool,
    pub resolution_mode: ResolutionMode,
    pub eligibility_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<GateCheck>,
    pub automation_log: String,
    /// Nominal playbook duration when automation ran, otherwise zero
    pub auto_resolution_time_sec: f64,
    #[serde(default)]
    pub steps_executed: Vec<StepRecord>,
    /// Seed of the outcome draw, absent when automation never ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_seed: Option<u64>,
    pub processed_at: DateTime<Utc>,
}

impl ResolutionRecord {
    pub fn subject_id(&self) -> &str {
        &self.incident.subject_id
    }

    /// Whether the confidence gate refused automation
    pub fn is_low_confidence(&self) -> bool {
        self.blocked_by == Some(GateCheck::Confidence)
    }

    /// Project onto the archive schema
    pub fn to_log_entry(&self) -> LogEntry {
        LogEntry {
            timestamp: self.processed_at.format(LOG_TIMESTAMP_FMT).to_string(),
            subject_id: self.incident.subject_id.clone(),
            predicted_issue: self.predicted_issue.to_string(),
            impact_score: round2(self.impact_score),
            resolution_mode: self.resolution_mode,
            eligibility_reason: self.eligibility_reason.clone(),
            auto_resolution_time_sec: round1(self.auto_resolution_time_sec),
            automation_log: self.automation_log.clone(),
        }
    }
}

// ============================================================================
// Archive projection
// ============================================================================

/// Timestamp format used in archive rows
pub const LOG_TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Archive columns, in order. New columns may only be appended.
pub const LOG_COLUMNS: [&str; 8] = [
    "timestamp",
    "subject_id",
    "predicted_issue",
    "impact_score",
    "resolution_mode",
    "eligibility_reason",
    "auto_resolution_time_sec",
    "automation_log",
];

/// One archived decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    #[serde(alias = "atm_id")]
    pub subject_id: String,
    pub predicted_issue: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub impact_score: f64,
    pub resolution_mode: ResolutionMode,
    #[serde(default)]
    pub eligibility_reason: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub auto_resolution_time_sec: f64,
    #[serde(default)]
    pub automation_log: String,
}

/// Accept a number, a numeric string, or anything else as 0.0
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(if number.is_finite() { number } else { 0.0 })
}
