//! Escalation Evaluator: mandatory human authority
//!
//! An incident escalates when EITHER its impact or its downtime reaches the
//! policy threshold. The status text lists every trigger that fired and
//! always carries the literal `ESCALATED` token when escalated, since
//! downstream consumers match on it.

use crate::config::EscalationPolicy;
use serde::{Deserialize, Serialize};

/// Token present in every escalated status text
pub const ESCALATED_TOKEN: &str = "ESCALATED";

/// Status text when no threshold was reached
pub const NORMAL_STATUS: &str = "✅ Normal: Monitor";

/// Why an incident escalated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// Impact reached the impact threshold
    Impact { impact_score: f64, threshold: f64 },
    /// Downtime reached the downtime threshold
    Downtime { downtime_minutes: f64, threshold: f64 },
}

impl std::fmt::Display for EscalationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Impact {
                impact_score,
                threshold,
            } => write!(
                f,
                "Impact ₹{:.0} exceeds threshold ₹{:.0}",
                impact_score, threshold
            ),
            Self::Downtime {
                downtime_minutes,
                threshold,
            } => write!(
                f,
                "Downtime {}m exceeds threshold {}m",
                downtime_minutes, threshold
            ),
        }
    }
}

/// Outcome of the escalation check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub is_escalated: bool,
    /// Every trigger that fired, impact first
    pub triggers: Vec<EscalationTrigger>,
    pub status_text: String,
}

/// Threshold-based escalation evaluator
#[derive(Debug, Clone, Default)]
pub struct EscalationEvaluator {
    policy: EscalationPolicy,
}

impl EscalationEvaluator {
    pub fn new(policy: EscalationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Decide whether an incident needs human authority
    pub fn evaluate(&self, impact_score: f64, downtime_minutes: f64) -> EscalationDecision {
        let mut triggers = Vec::new();
        if impact_score >= self.policy.impact_threshold {
            triggers.push(EscalationTrigger::Impact {
                impact_score,
                threshold: self.policy.impact_threshold,
            });
        }
        if downtime_minutes >= self.policy.downtime_threshold_minutes {
            triggers.push(EscalationTrigger::Downtime {
                downtime_minutes,
                threshold: self.policy.downtime_threshold_minutes,
            });
        }

        let status_text = if triggers.is_empty() {
            NORMAL_STATUS.to_string()
        } else {
            let reasons = triggers
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            format!("🚨 {ESCALATED_TOKEN}: {reasons}")
        };

        EscalationDecision {
            is_escalated: !triggers.is_empty(),
            triggers,
            status_text,
        }
    }
}
