//! Impact Scorer: financial exposure of an incident
//!
//! ```text
//! impact = volume × avg_amount × (downtime_minutes / 60) × (1 + complaints × 0.05)
//! ```
//!
//! The result is estimated exposure in rupees, rounded to two decimals.
//! Downtime below one minute counts as one minute so that an outage reported
//! with zero downtime still carries exposure.

use crate::error::{TriageError, TriageResult};
use crate::incident::Incident;
use serde::{Deserialize, Serialize};

/// Each complaint adds 5% to the impact multiplier
pub const COMPLAINT_WEIGHT: f64 = 0.05;

/// Minutes → hours
const DOWNTIME_DIVISOR: f64 = 60.0;

/// Minimum exposure window in minutes
const MIN_DOWNTIME_MINUTES: f64 = 1.0;

fn check_input(field: &str, value: f64) -> TriageResult<f64> {
    if !value.is_finite() {
        return Err(TriageError::validation(field, "must be a finite number"));
    }
    if value < 0.0 {
        return Err(TriageError::validation(
            field,
            format!("must be non-negative, got {value}"),
        ));
    }
    Ok(value)
}

/// Round to two decimal places
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to one decimal place
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Compute the impact score.
///
/// Fails only when an input is non-finite, or when volume, amount or
/// complaint count is negative.
pub fn score(
    transaction_volume: f64,
    avg_amount: f64,
    downtime_minutes: f64,
    complaint_count: f64,
) -> TriageResult<f64> {
    let volume = check_input("transaction_volume", transaction_volume)?;
    let amount = check_input("avg_amount", avg_amount)?;
    let complaints = check_input("complaint_count", complaint_count)?;
    if !downtime_minutes.is_finite() {
        return Err(TriageError::validation(
            "downtime_minutes",
            "must be a finite number",
        ));
    }
    let downtime = downtime_minutes.max(MIN_DOWNTIME_MINUTES);

    let base_loss = volume * amount * (downtime / DOWNTIME_DIVISOR);
    let complaint_multiplier = 1.0 + complaints * COMPLAINT_WEIGHT;
    Ok(round2(base_loss * complaint_multiplier))
}

/// Score a validated incident
pub fn score_incident(incident: &Incident) -> TriageResult<f64> {
    score(
        incident.transaction_volume as f64,
        incident.avg_amount,
        incident.downtime_minutes,
        incident.complaint_count as f64,
    )
}

/// Severity band for display and grouping. Not used by escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_score(impact_score: f64) -> Self {
        if impact_score >= 500_000.0 {
            Self::Critical
        } else if impact_score >= 100_000.0 {
            Self::High
        } else if impact_score >= 20_000.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Human-readable tag with a traffic-light marker
    pub fn label(&self) -> &'static str {
        match self {
            Self::Critical => "🔴 CRITICAL",
            Self::High => "🟠 HIGH",
            Self::Medium => "🟡 MEDIUM",
            Self::Low => "🟢 LOW",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}
