//! PayGuard Triage Engine
//!
//! Deterministic decision core for payment-terminal incidents:
//! - Impact scoring in rupees, with a display severity band
//! - Escalation to human authority above impact or downtime thresholds
//! - An automation gate: ML confidence first, then risk ceilings
//! - Simulated first-level remediation playbooks with seeded outcomes
//! - Batch KPIs and an append-only JSONL archive of every decision
//!
//! # Usage
//!
//! ```no_run
//! use payguard_engine::{
//!     ErrorCodeClassifier, OutcomeSeed, PipelineOrchestrator, RawIncident, TriageConfig,
//! };
//!
//! # fn main() -> Result<(), payguard_engine::TriageError> {
//! let engine = PipelineOrchestrator::new(TriageConfig::default())?;
//! let row: RawIncident = serde_json::from_str(
//!     r#"{"atm_id":"ATM-1001","location":"Mumbai Central","hour_of_day":14,
//!         "transaction_volume":40,"avg_amount":750,"downtime_minutes":25,
//!         "complaint_count":8,"error_code":"E001"}"#,
//! )?;
//! let record = engine.process_raw(row, &ErrorCodeClassifier, OutcomeSeed::Explicit(42))?;
//! println!("{} → {}", record.subject_id(), record.resolution_mode);
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod archive;
pub mod classify;
pub mod config;
pub mod error;
pub mod escalation;
pub mod gate;
pub mod impact;
pub mod incident;
pub mod metrics;
pub mod pipeline;
pub mod playbook;
pub mod record;

pub use action::{recommend, recommend_str, ActionRule};
pub use archive::{
    ArchiveHandle, ArchiveHeader, ArchiveSummary, ArchiveWriter, LogArchive, WriterTotals,
};
pub use classify::{Classifier, ErrorCodeClassifier, PreClassified};
pub use config::{
    AutomationPolicy, ConfigOverrides, EscalationPolicy, ExecutionMode, TriageConfig,
};
pub use error::{ArchiveError, ArchiveResult, RowError, TriageError, TriageResult};
pub use escalation::{EscalationDecision, EscalationEvaluator, EscalationTrigger};
pub use gate::{AutomationGate, GateCheck, GateInput, GateResult};
pub use impact::Severity;
pub use incident::{Classification, Incident, IssueType, LooseValue, RawIncident};
pub use metrics::{AutomationMetrics, RepeatSubject};
pub use pipeline::{BatchReport, PersistenceFailure, PersistenceReport, PipelineOrchestrator};
pub use playbook::{
    Clock, FixedClock, OutcomeSeed, PlaybookExecution, PlaybookExecutor, PlaybookOutcome,
    StepRecord, SystemClock,
};
pub use record::{LogEntry, ResolutionMode, ResolutionRecord};
