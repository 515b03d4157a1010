//! Triage configuration
//!
//! Every policy threshold is configurable. Values are layered:
//!
//! ```text
//! defaults → TOML file → PAYGUARD_* environment → per-run overrides
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `PAYGUARD_CONFIDENCE_THRESHOLD` | `0.60` | ML confidence below which automation is refused |
//! | `PAYGUARD_ESCALATION_IMPACT` | `100000` | Impact (₹) at or above which an incident escalates |
//! | `PAYGUARD_ESCALATION_DOWNTIME` | `120` | Downtime (min) at or above which an incident escalates |
//! | `PAYGUARD_AUTO_MAX_IMPACT` | `50000` | Impact ceiling for automated remediation |
//! | `PAYGUARD_AUTO_MAX_DOWNTIME` | `60` | Downtime ceiling for automated remediation |
//! | `PAYGUARD_AUTO_MAX_COMPLAINTS` | `15` | Complaint ceiling for automated remediation |
//! | `PAYGUARD_MANUAL_BASELINE_MINUTES` | `120` | Technician minutes saved per auto-resolved incident |
//! | `PAYGUARD_MAX_WORKERS` | `8` | Parallel incident workers in a batch |
//! | `PAYGUARD_EXECUTION_MODE` | `stable` | `stable` (replayable) or `live` |
//! | `PAYGUARD_OUTCOME_SEED` | unset | Base seed for outcome draws |
//! | `PAYGUARD_ARCHIVE_PATH` | `data/automation_logs.jsonl` | Archive location |

use crate::error::{TriageError, TriageResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Sensible operating range for the confidence threshold. Values outside are
/// accepted but logged.
pub const SENSIBLE_CONFIDENCE_RANGE: (f64, f64) = (0.40, 0.95);

/// Thresholds that make human escalation mandatory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Impact score (₹) at or above which the incident escalates
    pub impact_threshold: f64,
    /// Downtime (minutes) at or above which the incident escalates
    pub downtime_threshold_minutes: f64,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            impact_threshold: 100_000.0,
            downtime_threshold_minutes: 120.0,
        }
    }
}

/// Risk ceilings for automated remediation. Values strictly above a ceiling
/// block automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationPolicy {
    pub max_impact: f64,
    pub max_downtime_minutes: f64,
    pub max_complaints: u32,
}

impl Default for AutomationPolicy {
    fn default() -> Self {
        Self {
            max_impact: 50_000.0,
            max_downtime_minutes: 60.0,
            max_complaints: 15,
        }
    }
}

/// How outcome draws are seeded across a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Replayable: identical inputs always produce identical outcomes
    #[default]
    Stable,
    /// Outcome draws use fresh entropy; everything else stays deterministic
    Live,
}

impl std::str::FromStr for ExecutionMode {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" | "demo" => Ok(Self::Stable),
            "live" => Ok(Self::Live),
            other => Err(TriageError::config(format!(
                "unknown execution mode '{other}' (expected 'stable' or 'live')"
            ))),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stable => write!(f, "stable"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// ML confidence below which an incident is routed to a human
    pub confidence_threshold: f64,
    pub escalation: EscalationPolicy,
    pub automation: AutomationPolicy,
    /// Technician minutes a manual diagnostic cycle takes on average
    pub manual_baseline_minutes: u32,
    /// Upper bound on concurrently processed incidents in a batch
    pub max_parallel_workers: usize,
    pub execution_mode: ExecutionMode,
    /// Base seed for outcome draws in stable mode. When unset, each incident
    /// derives its own seed from its identity.
    pub outcome_seed: Option<u64>,
    pub archive_path: PathBuf,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.60,
            escalation: EscalationPolicy::default(),
            automation: AutomationPolicy::default(),
            manual_baseline_minutes: 120,
            max_parallel_workers: 8,
            execution_mode: ExecutionMode::Stable,
            outcome_seed: None,
            archive_path: PathBuf::from("data/automation_logs.jsonl"),
        }
    }
}

/// Per-run overrides. Only `Some` values are applied.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub confidence_threshold: Option<f64>,
    pub execution_mode: Option<ExecutionMode>,
    pub outcome_seed: Option<u64>,
    pub archive_path: Option<PathBuf>,
    pub max_parallel_workers: Option<usize>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> TriageResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| TriageError::config(format!("{name} has invalid value '{raw}'"))),
        _ => Ok(None),
    }
}

impl TriageConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> TriageResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file
    pub fn from_file(path: &Path) -> TriageResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TriageError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `PAYGUARD_*` environment variables on top of the current values
    pub fn apply_env(&mut self) -> TriageResult<()> {
        if let Some(v) = env_parse("PAYGUARD_CONFIDENCE_THRESHOLD")? {
            self.confidence_threshold = v;
        }
        if let Some(v) = env_parse("PAYGUARD_ESCALATION_IMPACT")? {
            self.escalation.impact_threshold = v;
        }
        if let Some(v) = env_parse("PAYGUARD_ESCALATION_DOWNTIME")? {
            self.escalation.downtime_threshold_minutes = v;
        }
        if let Some(v) = env_parse("PAYGUARD_AUTO_MAX_IMPACT")? {
            self.automation.max_impact = v;
        }
        if let Some(v) = env_parse("PAYGUARD_AUTO_MAX_DOWNTIME")? {
            self.automation.max_downtime_minutes = v;
        }
        if let Some(v) = env_parse("PAYGUARD_AUTO_MAX_COMPLAINTS")? {
            self.automation.max_complaints = v;
        }
        if let Some(v) = env_parse("PAYGUARD_MANUAL_BASELINE_MINUTES")? {
            self.manual_baseline_minutes = v;
        }
        if let Some(v) = env_parse("PAYGUARD_MAX_WORKERS")? {
            self.max_parallel_workers = v;
        }
        if let Some(v) = env_parse("PAYGUARD_EXECUTION_MODE")? {
            self.execution_mode = v;
        }
        if let Some(v) = env_parse("PAYGUARD_OUTCOME_SEED")? {
            self.outcome_seed = Some(v);
        }
        if let Some(v) = env_parse::<String>("PAYGUARD_ARCHIVE_PATH")? {
            self.archive_path = PathBuf::from(v);
        }
        Ok(())
    }

    /// Apply per-run overrides
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = overrides.confidence_threshold {
            self.confidence_threshold = v;
        }
        if let Some(v) = overrides.execution_mode {
            self.execution_mode = v;
        }
        if let Some(v) = overrides.outcome_seed {
            self.outcome_seed = Some(v);
        }
        if let Some(ref v) = overrides.archive_path {
            self.archive_path = v.clone();
        }
        if let Some(v) = overrides.max_parallel_workers {
            self.max_parallel_workers = v;
        }
    }

    /// Reject configurations the engine cannot run with.
    ///
    /// A confidence threshold inside [0, 1] but outside
    /// [`SENSIBLE_CONFIDENCE_RANGE`] is allowed with a warning.
    pub fn validate(&self) -> TriageResult<()> {
        let t = self.confidence_threshold;
        if !t.is_finite() || !(0.0..=1.0).contains(&t) {
            return Err(TriageError::config(format!(
                "confidence_threshold must be within [0, 1], got {t}"
            )));
        }
        let (lo, hi) = SENSIBLE_CONFIDENCE_RANGE;
        if t < lo || t > hi {
            warn!(
                confidence_threshold = t,
                "confidence threshold outside sensible range {lo:.2}-{hi:.2}"
            );
        }

        let non_negative = [
            ("escalation.impact_threshold", self.escalation.impact_threshold),
            (
                "escalation.downtime_threshold_minutes",
                self.escalation.downtime_threshold_minutes,
            ),
            ("automation.max_impact", self.automation.max_impact),
            (
                "automation.max_downtime_minutes",
                self.automation.max_downtime_minutes,
            ),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(TriageError::config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        if self.max_parallel_workers == 0 {
            return Err(TriageError::config("max_parallel_workers must be at least 1"));
        }
        Ok(())
    }

    /// Format as a one-line summary for startup logs
    pub fn summary(&self) -> String {
        format!(
            "threshold={:.2} escalate>=₹{:.0}/{:.0}min auto<=₹{:.0}/{:.0}min/{} complaints mode={} workers={}",
            self.confidence_threshold,
            self.escalation.impact_threshold,
            self.escalation.downtime_threshold_minutes,
            self.automation.max_impact,
            self.automation.max_downtime_minutes,
            self.automation.max_complaints,
            self.execution_mode,
            self.max_parallel_workers,
        )
    }
}
