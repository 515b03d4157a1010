//! Action Rule Engine: deterministic issue → action, SLA and team lookup
//!
//! The table is fixed at compile time. Unknown labels resolve to the L1
//! support fallback, so [`recommend`] is total over every possible input.

use crate::incident::IssueType;
use serde::Serialize;

/// Recommended remediation for an issue type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRule {
    /// Operator-facing instructions
    pub action: &'static str,
    /// Resolution SLA in minutes
    pub sla_minutes: u32,
    /// Team that owns the incident
    pub team: &'static str,
}

static NETWORK_FAILURE: ActionRule = ActionRule {
    action: "Restart network interface; verify ISP connectivity; check firewall rules.",
    sla_minutes: 30,
    team: "Network Operations",
};

static CARD_DECLINED: ActionRule = ActionRule {
    action: "Check card processor gateway status; review decline reason codes; contact issuing bank if batch failure.",
    sla_minutes: 15,
    team: "Payments Team",
};

static HARDWARE_FAULT: ActionRule = ActionRule {
    action: "Dispatch field technician immediately; run hardware diagnostics; check card reader & dispensing mechanism.",
    sla_minutes: 60,
    team: "Field Maintenance",
};

static CASH_OUT: ActionRule = ActionRule {
    action: "Schedule emergency cash replenishment; notify branch manager; temporarily disable cash withdrawal.",
    sla_minutes: 45,
    team: "Cash Management",
};

static AUTH_TIMEOUT: ActionRule = ActionRule {
    action: "Check authentication server latency; review API timeout configs; increase retry window.",
    sla_minutes: 20,
    team: "Backend Engineering",
};

/// Entry used for any issue type not in the table
pub static FALLBACK_ACTION: ActionRule = ActionRule {
    action: "Log incident; assign to L1 support for triage.",
    sla_minutes: 30,
    team: "L1 Support",
};

/// Look up the action rule for an issue type
pub fn recommend(issue: &IssueType) -> &'static ActionRule {
    match issue {
        IssueType::NetworkFailure => &NETWORK_FAILURE,
        IssueType::CardDeclined => &CARD_DECLINED,
        IssueType::HardwareFault => &HARDWARE_FAULT,
        IssueType::CashOut => &CASH_OUT,
        IssueType::AuthTimeout => &AUTH_TIMEOUT,
        IssueType::Unrecognized(_) => &FALLBACK_ACTION,
    }
}

/// Look up the action rule for a raw classifier label
pub fn recommend_str(label: &str) -> &'static ActionRule {
    recommend(&IssueType::parse(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_issues_have_distinct_teams() {
        let teams: std::collections::HashSet<_> =
            IssueType::KNOWN.iter().map(|i| recommend(i).team).collect();
        assert_eq!(teams.len(), 5);
        assert!(!teams.contains(FALLBACK_ACTION.team));
    }

    #[test]
    fn test_table_values() {
        assert_eq!(recommend(&IssueType::CardDeclined).sla_minutes, 15);
        assert_eq!(recommend(&IssueType::HardwareFault).team, "Field Maintenance");
        assert_eq!(recommend_str("auth_timeout").sla_minutes, 20);
    }

    #[test]
    fn test_unknown_labels_fall_back() {
        for label in ["", "unknown", "NETWORK_FAILURE", "cash out"] {
            let rule = recommend_str(label);
            assert_eq!(rule, &FALLBACK_ACTION, "label {label:?}");
            assert_eq!(rule.team, "L1 Support");
            assert_eq!(rule.sla_minutes, 30);
        }
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let a = recommend_str("cash_out");
        let b = recommend_str("cash_out");
        assert!(std::ptr::eq(a, b));
    }
}
