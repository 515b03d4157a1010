//! Playbook Executor: simulated first-level remediation
//!
//! Each known issue type has a fixed playbook of ordered steps, a success
//! rate and an expected duration. Execution is strictly sequential and every
//! step completes; success is decided once, after the last step, by a single
//! seeded draw from `[0, 1)`:
//!
//! ```text
//! draw < success_rate  → RESOLVED          (closed, no human needed)
//! otherwise            → ATTEMPTED_FAILED  (handed off with diagnostics)
//! ```
//!
//! Steps are simulated. In production each one would be a remote call to the
//! terminal or its controller.

use crate::incident::{Incident, IssueType};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Playbook table
// ============================================================================

/// One simulated remediation step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybookStep {
    pub name: &'static str,
    pub description: &'static str,
    /// Nominal duration of the real operation, informational only
    pub nominal_duration_secs: f64,
}

/// Ordered steps plus the historical success rate for an issue type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Playbook {
    pub steps: &'static [PlaybookStep],
    /// Probability of full auto-resolution, in [0, 1]
    pub success_rate: f64,
    /// Expected wall-clock seconds for the automation to complete
    pub expected_duration_secs: u32,
}

const fn step(
    name: &'static str,
    description: &'static str,
    nominal_duration_secs: f64,
) -> PlaybookStep {
    PlaybookStep {
        name,
        description,
        nominal_duration_secs,
    }
}

static NETWORK_FAILURE: Playbook = Playbook {
    steps: &[
        step("PING_CHECK", "Pinging gateway 192.168.1.1 … response: 32ms", 0.4),
        step("INTERFACE_RESET", "Sending remote reset signal to NIC eth0 …", 0.8),
        step("DNS_FLUSH", "Flushing DNS cache on ATM controller …", 0.3),
        step(
            "CONNECTIVITY_TEST",
            "Re-testing outbound connectivity to payment processor …",
            0.6,
        ),
        step("VERIFY", "Confirming transaction heartbeat restored …", 0.5),
    ],
    success_rate: 0.72,
    expected_duration_secs: 45,
};

static CARD_DECLINED: Playbook = Playbook {
    steps: &[
        step(
            "GATEWAY_STATUS",
            "Querying card processor gateway health endpoint …",
            0.3,
        ),
        step(
            "RETRY_BATCH",
            "Triggering retry on last 5 declined transactions …",
            0.5,
        ),
        step(
            "RULE_CHECK",
            "Verifying no new decline rules activated in last 1hr …",
            0.4,
        ),
        step("SESSION_RESET", "Resetting processor session token …", 0.3),
        step("VERIFY", "Re-running test transaction with dummy card …", 0.4),
    ],
    success_rate: 0.65,
    expected_duration_secs: 30,
};

static AUTH_TIMEOUT: Playbook = Playbook {
    steps: &[
        step(
            "LATENCY_CHECK",
            "Measuring round-trip to auth server: 2340ms (degraded) …",
            0.3,
        ),
        step(
            "TIMEOUT_EXTEND",
            "Pushing config update: auth_timeout_ms = 8000 …",
            0.5,
        ),
        step(
            "RETRY_QUEUE",
            "Draining and retrying 12 queued auth requests …",
            0.6,
        ),
        step(
            "CACHE_WARMUP",
            "Pre-warming session token cache for this ATM …",
            0.4,
        ),
        step("VERIFY", "Auth latency now 310ms, threshold passed …", 0.5),
    ],
    success_rate: 0.80,
    expected_duration_secs: 25,
};

// Cassettes cannot be refilled remotely; automation mostly preps the branch.
static CASH_OUT: Playbook = Playbook {
    steps: &[
        step(
            "BALANCE_VERIFY",
            "Pulling cassette sensor readings: 0 notes detected …",
            0.3,
        ),
        step(
            "ALERT_DISPATCH",
            "Auto-creating cash replenishment ticket in ticketing system …",
            0.4,
        ),
        step(
            "BRANCH_NOTIFY",
            "Sending SMS alert to branch manager (+91-XXXXXX) …",
            0.3,
        ),
        step(
            "PARTIAL_DISABLE",
            "Disabling cash-withdrawal; keeping balance enquiry active …",
            0.4,
        ),
    ],
    success_rate: 0.45,
    expected_duration_secs: 20,
};

static HARDWARE_FAULT: Playbook = Playbook {
    steps: &[
        step("DIAGNOSTICS", "Running remote hardware diagnostic suite …", 0.5),
        step("SOFT_RESET", "Attempting soft reset of card reader module …", 0.6),
        step("ERROR_LOG_PULL", "Pulling error logs from ATM firmware …", 0.4),
        step(
            "TICKET_CREATE",
            "Auto-creating field dispatch ticket with diagnostic dump …",
            0.3,
        ),
    ],
    success_rate: 0.20,
    expected_duration_secs: 15,
};

/// Playbook for issue types without a dedicated one
pub static FALLBACK_PLAYBOOK: Playbook = Playbook {
    steps: &[
        step(
            "LOG_INCIDENT",
            "Logging incident to central incident management system …",
            0.3,
        ),
        step(
            "TICKET_CREATE",
            "Auto-creating support ticket with classification context …",
            0.4,
        ),
    ],
    success_rate: 0.10,
    expected_duration_secs: 10,
};

/// Select the playbook for an issue type
pub fn playbook_for(issue: &IssueType) -> &'static Playbook {
    match issue {
        IssueType::NetworkFailure => &NETWORK_FAILURE,
        IssueType::CardDeclined => &CARD_DECLINED,
        IssueType::HardwareFault => &HARDWARE_FAULT,
        IssueType::CashOut => &CASH_OUT,
        IssueType::AuthTimeout => &AUTH_TIMEOUT,
        IssueType::Unrecognized(_) => &FALLBACK_PLAYBOOK,
    }
}

// ============================================================================
// Seeds and clocks
// ============================================================================

/// Where the outcome draw gets its seed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSeed {
    /// Caller-supplied seed, for replay
    Explicit(u64),
    /// Stable hash of the incident's identity fields
    Derived,
    /// Fresh entropy (live mode). The seed actually used is still recorded.
    Entropy,
}

/// Stable 64-bit seed from every identity field of the incident.
///
/// Independent per incident: two incidents with the same impact score but
/// different identities draw independently.
pub fn derive_seed(incident: &Incident) -> u64 {
    let hash = blake3::hash(incident.identity_key().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

impl OutcomeSeed {
    /// Concrete seed for this incident
    pub fn resolve(&self, incident: &Incident) -> u64 {
        match self {
            Self::Explicit(seed) => *seed,
            Self::Derived => derive_seed(incident),
            Self::Entropy => rand::random(),
        }
    }
}

/// Source of step timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant, for reproducible logs
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ============================================================================
// Execution
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Completed,
}

/// A step as it was executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub description: String,
    pub status: StepStatus,
    pub completed_at: DateTime<Utc>,
}

/// Terminal outcome of remediation for one incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybookOutcome {
    /// Automation fixed the incident
    Resolved,
    /// Automation ran but the issue persists; human handoff required
    AttemptedFailed,
    /// Automation never ran (gate refused)
    Skipped,
}

/// Full trace of one playbook run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookExecution {
    pub issue: IssueType,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
    pub outcome: PlaybookOutcome,
    pub success_rate: f64,
    pub draw: f64,
    pub seed: u64,
    pub expected_duration_secs: u32,
}

const TIME_FMT: &str = "%H:%M:%S";

impl PlaybookExecution {
    /// Seconds attributed to automation: the playbook's nominal expected
    /// duration, not simulation wall time
    pub fn auto_resolution_time_sec(&self) -> f64 {
        f64::from(self.expected_duration_secs)
    }

    /// Render the audit log. Depends only on the recorded steps and outcome,
    /// so it can be rebuilt from a stored execution at any time.
    pub fn narrate(&self) -> String {
        if self.outcome == PlaybookOutcome::Skipped {
            return format!(
                "[SKIP] Auto-remediation bypassed for issue: {}. Routed to human team.",
                self.issue
            );
        }
        let mut lines = Vec::with_capacity(self.steps.len() + 3);
        lines.push(format!(
            "[START] Automation initiated at {} for issue: {}",
            self.started_at.format(TIME_FMT),
            self.issue
        ));
        for step in &self.steps {
            lines.push(format!(
                "  [{}] {}: {}",
                step.completed_at.format(TIME_FMT),
                step.name,
                step.description
            ));
        }
        match self.outcome {
            PlaybookOutcome::Resolved => {
                lines.push(format!(
                    "[SUCCESS] All steps completed. Incident auto-resolved in ~{}s.",
                    self.expected_duration_secs
                ));
                lines.push("[CLOSED] No human intervention required.".to_string());
            }
            PlaybookOutcome::AttemptedFailed => {
                lines.push("[PARTIAL] Automation steps executed but issue persists.".to_string());
                lines.push(
                    "[HANDOFF] Routing to human team with full diagnostic context attached."
                        .to_string(),
                );
            }
            // Returned early above
            PlaybookOutcome::Skipped => {}
        }
        lines.join("\n")
    }
}

/// Log text for an incident the risk gate kept away from automation
pub fn skipped_log(reason: &str) -> String {
    format!("[SKIP] Auto-remediation bypassed. {reason}. Routed to human team.")
}

/// Log text for an incident the confidence gate kept away from automation
pub fn skipped_low_confidence_log(confidence: f64, threshold: f64) -> String {
    format!(
        "[SKIP] ML confidence {confidence:.2} is below threshold {threshold:.2}. \
         Prediction uncertain, routing to human for verification."
    )
}

/// Runs playbooks against a clock
#[derive(Clone)]
pub struct PlaybookExecutor {
    clock: Arc<dyn Clock>,
}

impl Default for PlaybookExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlaybookExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybookExecutor").finish_non_exhaustive()
    }
}

impl PlaybookExecutor {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Execute the playbook for `issue` and draw the outcome from `seed`
    pub fn execute(&self, issue: &IssueType, seed: u64) -> PlaybookExecution {
        let playbook = playbook_for(issue);
        let started_at = self.clock.now();

        let steps: Vec<StepRecord> = playbook
            .steps
            .iter()
            .map(|s| StepRecord {
                name: s.name.to_string(),
                description: s.description.to_string(),
                status: StepStatus::Completed,
                completed_at: self.clock.now(),
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(seed);
        let draw: f64 = rng.gen();
        let outcome = if draw < playbook.success_rate {
            PlaybookOutcome::Resolved
        } else {
            PlaybookOutcome::AttemptedFailed
        };

        debug!(
            issue = %issue,
            steps = steps.len(),
            seed,
            draw,
            success_rate = playbook.success_rate,
            outcome = ?outcome,
            "Playbook executed"
        );

        PlaybookExecution {
            issue: issue.clone(),
            started_at,
            steps,
            outcome,
            success_rate: playbook.success_rate,
            draw,
            seed,
            expected_duration_secs: playbook.expected_duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_executor() -> PlaybookExecutor {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        PlaybookExecutor::with_clock(Arc::new(FixedClock(at)))
    }

    #[test]
    fn test_playbook_table_shapes() {
        assert_eq!(playbook_for(&IssueType::NetworkFailure).steps.len(), 5);
        assert_eq!(playbook_for(&IssueType::CardDeclined).steps.len(), 5);
        assert_eq!(playbook_for(&IssueType::AuthTimeout).steps.len(), 5);
        assert_eq!(playbook_for(&IssueType::CashOut).steps.len(), 4);
        assert_eq!(playbook_for(&IssueType::HardwareFault).steps.len(), 4);

        let fallback = playbook_for(&IssueType::parse("coin_jam"));
        assert_eq!(fallback, &FALLBACK_PLAYBOOK);
        assert_eq!(fallback.steps.len(), 2);
        assert_eq!(fallback.success_rate, 0.10);

        for issue in IssueType::KNOWN {
            let rate = playbook_for(&issue).success_rate;
            assert!((0.0..=1.0).contains(&rate));
        }
    }

    #[test]
    fn test_all_steps_complete_in_order() {
        let exec = fixed_executor().execute(&IssueType::NetworkFailure, 42);
        let names: Vec<&str> = exec.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "PING_CHECK",
                "INTERFACE_RESET",
                "DNS_FLUSH",
                "CONNECTIVITY_TEST",
                "VERIFY"
            ]
        );
        assert!(exec.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert_eq!(exec.auto_resolution_time_sec(), 45.0);
    }

    #[test]
    fn test_outcome_is_reproducible_for_seed() {
        let executor = fixed_executor();
        for seed in [0, 1, 42, 9_998, u64::MAX] {
            let a = executor.execute(&IssueType::CardDeclined, seed);
            let b = executor.execute(&IssueType::CardDeclined, seed);
            assert_eq!(a.outcome, b.outcome);
            assert_eq!(a.draw, b.draw);
            assert!((0.0..1.0).contains(&a.draw));
            let expected = if a.draw < 0.65 {
                PlaybookOutcome::Resolved
            } else {
                PlaybookOutcome::AttemptedFailed
            };
            assert_eq!(a.outcome, expected);
        }
    }

    #[test]
    fn test_outcomes_vary_across_seeds() {
        let executor = fixed_executor();
        let outcomes: std::collections::HashSet<_> = (0..200u64)
            .map(|seed| executor.execute(&IssueType::CashOut, seed).outcome)
            .collect();
        assert_eq!(outcomes.len(), 2, "both outcomes should occur at 45%");
    }

    #[test]
    fn test_narrate_success_and_failure() {
        let executor = fixed_executor();
        let mut exec = executor.execute(&IssueType::AuthTimeout, 7);

        exec.outcome = PlaybookOutcome::Resolved;
        let log = exec.narrate();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(
            lines[0],
            "[START] Automation initiated at 09:26:53 for issue: auth_timeout"
        );
        assert_eq!(lines.len(), 1 + 5 + 2);
        assert!(lines[1].starts_with("  [09:26:53] LATENCY_CHECK: "));
        assert!(log.contains("[SUCCESS]"));
        assert!(log.ends_with("[CLOSED] No human intervention required."));

        exec.outcome = PlaybookOutcome::AttemptedFailed;
        let log = exec.narrate();
        assert!(log.contains("[PARTIAL]"));
        assert!(log.contains("[HANDOFF]"));
        assert!(!log.contains("[CLOSED]"));

        exec.outcome = PlaybookOutcome::Skipped;
        let log = exec.narrate();
        assert_eq!(
            log,
            "[SKIP] Auto-remediation bypassed for issue: auth_timeout. Routed to human team."
        );
        assert!(!log.contains("[PARTIAL]"));
    }

    #[test]
    fn test_narrate_is_rebuildable_from_stored_execution() {
        let exec = fixed_executor().execute(&IssueType::HardwareFault, 3);
        let json = serde_json::to_string(&exec).unwrap();
        let restored: PlaybookExecution = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.narrate(), exec.narrate());
    }

    #[test]
    fn test_skip_logs() {
        assert_eq!(
            skipped_log("Incident is escalated, requires human authority"),
            "[SKIP] Auto-remediation bypassed. Incident is escalated, requires human authority. Routed to human team."
        );
        let log = skipped_low_confidence_log(0.412, 0.6);
        assert!(log.starts_with("[SKIP] ML confidence 0.41 is below threshold 0.60."));
    }

    #[test]
    fn test_seed_resolution() {
        let incident = Incident {
            subject_id: "ATM-2001".to_string(),
            location: "Chennai Mall".to_string(),
            hour_of_day: 3,
            transaction_volume: 40,
            avg_amount: 900.0,
            downtime_minutes: 20.0,
            complaint_count: 4,
            error_code: "E001".to_string(),
        };
        assert_eq!(OutcomeSeed::Explicit(9).resolve(&incident), 9);
        assert_eq!(
            OutcomeSeed::Derived.resolve(&incident),
            OutcomeSeed::Derived.resolve(&incident)
        );

        let mut twin = incident.clone();
        twin.subject_id = "ATM-2002".to_string();
        assert_ne!(derive_seed(&incident), derive_seed(&twin));
    }
}
