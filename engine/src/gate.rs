//! Automation Eligibility Gate
//!
//! Two ordered gates decide whether remediation may run unattended. The
//! first failing gate short-circuits:
//!
//! ```text
//! Confidence gate   confidence < threshold            → MANUAL_REQUIRED
//!     │
//!     ▼
//! Risk gate         escalated                         → MANUAL_REQUIRED
//!                   impact     > max_impact           → MANUAL_REQUIRED
//!                   downtime   > max_downtime         → MANUAL_REQUIRED
//!                   complaints > max_complaints       → MANUAL_REQUIRED
//!     │
//!     ▼
//! Eligible          → PlaybookExecutor
//! ```
//!
//! The result is terminal for the incident and is never re-evaluated.

use crate::config::AutomationPolicy;
use serde::{Deserialize, Serialize};

/// Reason text when both gates pass
pub const ELIGIBLE_REASON: &str = "Eligible for automated first-level remediation";

/// Prefix shared by every confidence-gate reason
pub const LOW_CONFIDENCE_PREFIX: &str = "ML confidence";

/// Which check stopped automation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCheck {
    Confidence,
    Escalation,
    Impact,
    Downtime,
    Complaints,
}

impl std::fmt::Display for GateCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confidence => write!(f, "confidence"),
            Self::Escalation => write!(f, "escalation"),
            Self::Impact => write!(f, "impact"),
            Self::Downtime => write!(f, "downtime"),
            Self::Complaints => write!(f, "complaints"),
        }
    }
}

/// Terminal gate decision for one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub eligible: bool,
    pub reason: String,
    /// `None` when eligible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<GateCheck>,
}

impl GateResult {
    fn pass() -> Self {
        Self {
            eligible: true,
            reason: ELIGIBLE_REASON.to_string(),
            blocked_by: None,
        }
    }

    fn block(check: GateCheck, reason: String) -> Self {
        Self {
            eligible: false,
            reason,
            blocked_by: Some(check),
        }
    }

    /// Whether the confidence gate (not the risk gate) refused automation
    pub fn is_low_confidence(&self) -> bool {
        self.blocked_by == Some(GateCheck::Confidence)
    }
}

/// Inputs the gate looks at
#[derive(Debug, Clone, Copy)]
pub struct GateInput {
    pub confidence: f64,
    pub is_escalated: bool,
    pub impact_score: f64,
    pub downtime_minutes: f64,
    pub complaint_count: u32,
}

/// Confidence + risk gate
#[derive(Debug, Clone)]
pub struct AutomationGate {
    confidence_threshold: f64,
    policy: AutomationPolicy,
}

impl Default for AutomationGate {
    fn default() -> Self {
        Self::new(0.60, AutomationPolicy::default())
    }
}

impl AutomationGate {
    pub fn new(confidence_threshold: f64, policy: AutomationPolicy) -> Self {
        Self {
            confidence_threshold,
            policy,
        }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Run both gates in order
    pub fn evaluate(&self, input: &GateInput) -> GateResult {
        if input.confidence < self.confidence_threshold {
            return GateResult::block(
                GateCheck::Confidence,
                format!(
                    "{LOW_CONFIDENCE_PREFIX} {:.2} < threshold {:.2}",
                    input.confidence, self.confidence_threshold
                ),
            );
        }
        self.risk_gate(input)
    }

    fn risk_gate(&self, input: &GateInput) -> GateResult {
        if input.is_escalated {
            return GateResult::block(
                GateCheck::Escalation,
                "Incident is escalated, requires human authority".to_string(),
            );
        }
        if input.impact_score > self.policy.max_impact {
            return GateResult::block(
                GateCheck::Impact,
                format!(
                    "Impact ₹{:.0} exceeds auto-remediation ceiling ₹{:.0}",
                    input.impact_score, self.policy.max_impact
                ),
            );
        }
        if input.downtime_minutes > self.policy.max_downtime_minutes {
            return GateResult::block(
                GateCheck::Downtime,
                format!(
                    "Downtime {}min exceeds auto-remediation limit {}min",
                    input.downtime_minutes, self.policy.max_downtime_minutes
                ),
            );
        }
        if input.complaint_count > self.policy.max_complaints {
            return GateResult::block(
                GateCheck::Complaints,
                format!(
                    "Complaint volume {} exceeds safe automation threshold {}",
                    input.complaint_count, self.policy.max_complaints
                ),
            );
        }
        GateResult::pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> GateInput {
        GateInput {
            confidence: 0.90,
            is_escalated: false,
            impact_score: 18_000.0,
            downtime_minutes: 25.0,
            complaint_count: 8,
        }
    }

    #[test]
    fn test_low_risk_incident_is_eligible() {
        let r = AutomationGate::default().evaluate(&input());
        assert!(r.eligible);
        assert_eq!(r.reason, ELIGIBLE_REASON);
        assert_eq!(r.blocked_by, None);
    }

    #[test]
    fn test_confidence_gate_takes_precedence() {
        let gate = AutomationGate::default();
        let r = gate.evaluate(&GateInput {
            confidence: 0.55,
            is_escalated: true,
            impact_score: 1e9,
            ..input()
        });
        assert!(!r.eligible);
        assert!(r.is_low_confidence());
        assert_eq!(r.reason, "ML confidence 0.55 < threshold 0.60");
    }

    #[test]
    fn test_confidence_exactly_at_threshold_passes() {
        let r = AutomationGate::default().evaluate(&GateInput {
            confidence: 0.60,
            ..input()
        });
        assert!(r.eligible);
    }

    #[test]
    fn test_risk_checks_in_order() {
        let gate = AutomationGate::default();

        let all_bad = GateInput {
            is_escalated: true,
            impact_score: 60_000.0,
            downtime_minutes: 90.0,
            complaint_count: 30,
            ..input()
        };
        assert_eq!(gate.evaluate(&all_bad).blocked_by, Some(GateCheck::Escalation));

        let r = gate.evaluate(&GateInput {
            is_escalated: false,
            ..all_bad
        });
        assert_eq!(r.blocked_by, Some(GateCheck::Impact));
        assert!(r.reason.contains("₹50000"), "{}", r.reason);

        let r = gate.evaluate(&GateInput {
            is_escalated: false,
            impact_score: 10.0,
            ..all_bad
        });
        assert_eq!(r.blocked_by, Some(GateCheck::Downtime));
        assert!(r.reason.contains("60min"), "{}", r.reason);

        let r = gate.evaluate(&GateInput {
            is_escalated: false,
            impact_score: 10.0,
            downtime_minutes: 10.0,
            ..all_bad
        });
        assert_eq!(r.blocked_by, Some(GateCheck::Complaints));
        assert!(r.reason.contains("threshold 15"), "{}", r.reason);
    }

    #[test]
    fn test_ceilings_are_inclusive() {
        let r = AutomationGate::default().evaluate(&GateInput {
            impact_score: 50_000.0,
            downtime_minutes: 60.0,
            complaint_count: 15,
            ..input()
        });
        assert!(r.eligible);
    }

    #[test]
    fn prop_escalated_is_never_eligible() {
        let gate = AutomationGate::default();
        for impact in [0.0, 1.0, 49_999.0, 50_000.0, 2e6] {
            for downtime in [-10.0, 0.0, 30.0, 60.0, 500.0] {
                for complaints in [0, 5, 15, 16, 100] {
                    for confidence in [0.0, 0.59, 0.6, 1.0] {
                        let r = gate.evaluate(&GateInput {
                            confidence,
                            is_escalated: true,
                            impact_score: impact,
                            downtime_minutes: downtime,
                            complaint_count: complaints,
                        });
                        assert!(!r.eligible);
                    }
                }
            }
        }
    }
}
