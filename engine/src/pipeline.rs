//! Pipeline Orchestrator
//!
//! Per incident, in this exact order:
//!
//! ```text
//! RawIncident ──validate──▶ Incident ──classify──▶ Classification
//!      │
//!      ▼
//! impact score ─▶ action rule ─▶ escalation ─▶ gate (confidence, risk)
//!                                                  │
//!                                   eligible ──────┼────── blocked
//!                                      ▼                      ▼
//!                               playbook execution      MANUAL_REQUIRED
//!                                      │                      │
//!                                      └──────▶ ResolutionRecord ◀┘
//! ```
//!
//! Batches fan out on a `JoinSet` bounded by a `Semaphore`. Every finished
//! record goes to the single archive writer; a malformed row becomes a
//! [`RowError`] and the batch continues. Cancellation is checked before each
//! incident starts, so an incident is either fully recorded or absent.

use crate::action;
use crate::archive::ArchiveHandle;
use crate::classify::Classifier;
use crate::config::{ExecutionMode, TriageConfig};
use crate::error::{RowError, TriageResult};
use crate::escalation::EscalationEvaluator;
use crate::gate::{AutomationGate, GateInput};
use crate::impact::{self, Severity};
use crate::incident::{Classification, Incident, RawIncident};
use crate::metrics::AutomationMetrics;
use crate::playbook::{
    skipped_log, skipped_low_confidence_log, Clock, OutcomeSeed, PlaybookExecutor, SystemClock,
};
use crate::record::{ResolutionMode, ResolutionRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// Reports
// ============================================================================

/// A record that was decided but could not be archived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceFailure {
    pub subject_id: String,
    pub error: String,
}

/// Archive outcome for a batch, kept apart from the decisions themselves
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistenceReport {
    /// False when the batch ran without an archive
    pub enabled: bool,
    pub appended: usize,
    pub failures: Vec<PersistenceFailure>,
}

impl PersistenceReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub total_rows: usize,
    /// Sorted: MANUAL_REQUIRED, AUTO_ATTEMPTED, AUTO_RESOLVED, then impact descending
    pub records: Vec<ResolutionRecord>,
    /// Sorted by row index
    pub row_errors: Vec<RowError>,
    pub persistence: PersistenceReport,
    /// True when the batch stopped early; unstarted rows are absent
    pub cancelled: bool,
}

impl BatchReport {
    pub fn metrics(&self, manual_baseline_minutes: u32) -> AutomationMetrics {
        AutomationMetrics::from_records(&self.records, manual_baseline_minutes)
    }
}

/// Order records for reporting. Stable and idempotent.
pub fn sort_records(records: &mut [ResolutionRecord]) {
    records.sort_by(|a, b| {
        a.resolution_mode
            .sort_rank()
            .cmp(&b.resolution_mode.sort_rank())
            .then_with(|| b.impact_score.total_cmp(&a.impact_score))
    });
}

enum RowOutcome {
    Done {
        row_index: usize,
        record: Box<ResolutionRecord>,
        persisted: Option<Result<(), String>>,
    },
    Failed(RowError),
    Cancelled,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs incidents through scoring, escalation, gating and remediation
#[derive(Clone)]
pub struct PipelineOrchestrator {
    config: TriageConfig,
    escalation: EscalationEvaluator,
    gate: AutomationGate,
    executor: PlaybookExecutor,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Build from a validated configuration using the wall clock
    pub fn new(config: TriageConfig) -> TriageResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: TriageConfig, clock: Arc<dyn Clock>) -> TriageResult<Self> {
        config.validate()?;
        Ok(Self {
            escalation: EscalationEvaluator::new(config.escalation.clone()),
            gate: AutomationGate::new(config.confidence_threshold, config.automation.clone()),
            executor: PlaybookExecutor::with_clock(clock.clone()),
            clock,
            config,
        })
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// Seed source for the row at `row_index` of a batch
    pub fn seed_for_row(&self, row_index: usize) -> OutcomeSeed {
        match (self.config.execution_mode, self.config.outcome_seed) {
            (ExecutionMode::Live, _) => OutcomeSeed::Entropy,
            (ExecutionMode::Stable, Some(base)) => {
                OutcomeSeed::Explicit(base.wrapping_add(row_index as u64))
            }
            (ExecutionMode::Stable, None) => OutcomeSeed::Derived,
        }
    }

    /// Triage one validated, classified incident
    pub fn process(
        &self,
        incident: Incident,
        classification: Classification,
        seed: OutcomeSeed,
    ) -> TriageResult<ResolutionRecord> {
        let issue = classification.predicted_issue;
        let confidence = classification.confidence;

        let impact_score = impact::score_incident(&incident)?;
        let severity = Severity::from_score(impact_score);
        let rule = action::recommend(&issue);
        let escalation = self
            .escalation
            .evaluate(impact_score, incident.downtime_minutes);
        debug!(
            subject_id = %incident.subject_id,
            issue = %issue,
            impact_score,
            escalated = escalation.is_escalated,
            "Scored incident"
        );

        let gate = self.gate.evaluate(&GateInput {
            confidence,
            is_escalated: escalation.is_escalated,
            impact_score,
            downtime_minutes: incident.downtime_minutes,
            complaint_count: incident.complaint_count,
        });

        let (resolution_mode, automation_log, auto_secs, steps_executed, outcome_seed) =
            if gate.eligible {
                let seed = seed.resolve(&incident);
                let execution = self.executor.execute(&issue, seed);
                (
                    ResolutionMode::from(execution.outcome),
                    execution.narrate(),
                    execution.auto_resolution_time_sec(),
                    execution.steps,
                    Some(seed),
                )
            } else if gate.is_low_confidence() {
                (
                    ResolutionMode::ManualRequired,
                    skipped_low_confidence_log(confidence, self.gate.confidence_threshold()),
                    0.0,
                    Vec::new(),
                    None,
                )
            } else {
                (
                    ResolutionMode::ManualRequired,
                    skipped_log(&gate.reason),
                    0.0,
                    Vec::new(),
                    None,
                )
            };

        debug!(
            subject_id = %incident.subject_id,
            mode = %resolution_mode,
            blocked_by = ?gate.blocked_by,
            "Resolved incident"
        );

        Ok(ResolutionRecord {
            incident,
            predicted_issue: issue,
            ml_confidence: confidence,
            impact_score,
            severity,
            recommended_action: rule.action.to_string(),
            sla_minutes: rule.sla_minutes,
            responsible_team: rule.team.to_string(),
            escalation_status: escalation.status_text,
            is_escalated: escalation.is_escalated,
            resolution_mode,
            eligibility_reason: gate.reason,
            blocked_by: gate.blocked_by,
            automation_log,
            auto_resolution_time_sec: auto_secs,
            steps_executed,
            outcome_seed,
            processed_at: self.clock.now(),
        })
    }

    /// Validate, classify and triage one raw row
    pub fn process_raw(
        &self,
        raw: RawIncident,
        classifier: &dyn Classifier,
        seed: OutcomeSeed,
    ) -> TriageResult<ResolutionRecord> {
        let incident = Incident::try_from(raw.clone())?;
        let classification = classifier.classify(&incident, &raw)?;
        self.process(incident, classification, seed)
    }

    /// Triage a batch in parallel.
    ///
    /// When `archive` is given, every record is appended through it and the
    /// outcome lands in [`BatchReport::persistence`]. Archive failures never
    /// drop a record from the report.
    pub async fn run_batch(
        &self,
        rows: Vec<RawIncident>,
        classifier: Arc<dyn Classifier>,
        archive: Option<ArchiveHandle>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let total_rows = rows.len();
        info!(
            %batch_id,
            rows = total_rows,
            classifier = classifier.name(),
            workers = self.config.max_parallel_workers,
            mode = %self.config.execution_mode,
            "Starting triage batch"
        );

        let this = Arc::new(self.clone());
        let sem = Arc::new(Semaphore::new(self.config.max_parallel_workers));
        let mut join_set: JoinSet<RowOutcome> = JoinSet::new();

        for (row_index, raw) in rows.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let this = this.clone();
            let sem = sem.clone();
            let classifier = classifier.clone();
            let archive = archive.clone();
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return RowOutcome::Cancelled,
                    permit = sem.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return RowOutcome::Cancelled,
                    },
                };
                if cancel.is_cancelled() {
                    return RowOutcome::Cancelled;
                }

                let subject = raw.subject_hint();
                let seed = this.seed_for_row(row_index);
                let record = match this.process_raw(raw, classifier.as_ref(), seed) {
                    Ok(record) => record,
                    Err(e) => return RowOutcome::Failed(RowError::new(row_index, subject, &e)),
                };

                let persisted = match archive {
                    Some(handle) => Some(
                        handle
                            .append(record.to_log_entry())
                            .await
                            .map_err(|e| e.to_string()),
                    ),
                    None => None,
                };

                RowOutcome::Done {
                    row_index,
                    record: Box::new(record),
                    persisted,
                }
            });
        }

        let mut indexed = Vec::with_capacity(total_rows);
        let mut row_errors = Vec::new();
        let mut persistence = PersistenceReport {
            enabled: archive.is_some(),
            ..Default::default()
        };
        let mut skipped = 0usize;

        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(RowOutcome::Done {
                    row_index,
                    record,
                    persisted,
                }) => {
                    match persisted {
                        Some(Ok(())) => persistence.appended += 1,
                        Some(Err(error)) => {
                            warn!(subject_id = %record.subject_id(), %error, "Record not archived");
                            persistence.failures.push(PersistenceFailure {
                                subject_id: record.subject_id().to_string(),
                                error,
                            });
                        }
                        None => {}
                    }
                    indexed.push((row_index, *record));
                }
                Ok(RowOutcome::Failed(row_error)) => {
                    warn!(%row_error, "Rejected input row");
                    row_errors.push(row_error);
                }
                Ok(RowOutcome::Cancelled) => skipped += 1,
                Err(e) => {
                    warn!(error = %e, "Incident worker panicked");
                }
            }
        }

        // Input order first so the mode/impact sort is stable for equal keys
        indexed.sort_by_key(|(idx, _)| *idx);
        let mut records: Vec<ResolutionRecord> = indexed.into_iter().map(|(_, r)| r).collect();
        sort_records(&mut records);
        row_errors.sort_by_key(|e| e.row_index);

        let cancelled = cancel.is_cancelled() && records.len() + row_errors.len() < total_rows;
        info!(
            %batch_id,
            records = records.len(),
            row_errors = row_errors.len(),
            archived = persistence.appended,
            archive_failures = persistence.failures.len(),
            skipped,
            cancelled,
            "Triage batch finished"
        );

        BatchReport {
            batch_id,
            total_rows,
            records,
            row_errors,
            persistence,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateCheck;
    use crate::incident::IssueType;
    use crate::playbook::FixedClock;
    use chrono::{TimeZone, Utc};

    fn orchestrator() -> PipelineOrchestrator {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        PipelineOrchestrator::with_clock(TriageConfig::default(), Arc::new(FixedClock(at))).unwrap()
    }

    fn incident(volume: u64, amount: f64, downtime: f64, complaints: u32) -> Incident {
        Incident {
            subject_id: "ATM-3001".to_string(),
            location: "Bangalore MG Road".to_string(),
            hour_of_day: 9,
            transaction_volume: volume,
            avg_amount: amount,
            downtime_minutes: downtime,
            complaint_count: complaints,
            error_code: "E001".to_string(),
        }
    }

    fn classified(issue: IssueType, confidence: f64) -> Classification {
        Classification::new(issue, confidence).unwrap()
    }

    #[test]
    fn test_low_risk_incident_runs_playbook() {
        // 40 × 750 × (25/60) × 1.4 = 17 500
        let record = orchestrator()
            .process(
                incident(40, 750.0, 25.0, 8),
                classified(IssueType::NetworkFailure, 0.90),
                OutcomeSeed::Explicit(42),
            )
            .unwrap();
        assert_eq!(record.impact_score, 17_500.0);
        assert!(!record.is_escalated);
        assert_eq!(record.steps_executed.len(), 5);
        assert_eq!(record.auto_resolution_time_sec, 45.0);
        assert_eq!(record.outcome_seed, Some(42));
        assert_ne!(record.resolution_mode, ResolutionMode::ManualRequired);
        assert_eq!(record.responsible_team, "Network Operations");
    }

    #[test]
    fn test_escalated_incident_is_manual() {
        let record = orchestrator()
            .process(
                incident(150, 2000.0, 90.0, 25),
                classified(IssueType::CardDeclined, 0.99),
                OutcomeSeed::Derived,
            )
            .unwrap();
        assert_eq!(record.impact_score, 1_012_500.0);
        assert!(record.is_escalated);
        assert_eq!(record.resolution_mode, ResolutionMode::ManualRequired);
        assert_eq!(record.blocked_by, Some(GateCheck::Escalation));
        assert!(record.eligibility_reason.contains("escalated"));
        assert!(record.steps_executed.is_empty());
        assert_eq!(record.auto_resolution_time_sec, 0.0);
        assert!(record.automation_log.starts_with("[SKIP] Auto-remediation bypassed."));
    }

    #[test]
    fn test_low_confidence_is_manual_with_confidence_log() {
        let record = orchestrator()
            .process(
                incident(10, 100.0, 5.0, 0),
                classified(IssueType::AuthTimeout, 0.41),
                OutcomeSeed::Derived,
            )
            .unwrap();
        assert_eq!(record.resolution_mode, ResolutionMode::ManualRequired);
        assert!(record.is_low_confidence());
        assert!(record.eligibility_reason.starts_with("ML confidence 0.41"));
        assert!(record.automation_log.contains("below threshold 0.60"));
        assert_eq!(record.outcome_seed, None);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let o = orchestrator();
        let run = |seed| {
            o.process(
                incident(40, 750.0, 25.0, 8),
                classified(IssueType::CashOut, 0.9),
                seed,
            )
            .unwrap()
        };
        for s in 0..20 {
            assert_eq!(
                run(OutcomeSeed::Explicit(s)).resolution_mode,
                run(OutcomeSeed::Explicit(s)).resolution_mode
            );
        }
        assert_eq!(run(OutcomeSeed::Derived), run(OutcomeSeed::Derived));
    }

    #[test]
    fn test_seed_for_row() {
        let mut config = TriageConfig::default();
        let o = PipelineOrchestrator::new(config.clone()).unwrap();
        assert_eq!(o.seed_for_row(3), OutcomeSeed::Derived);

        config.outcome_seed = Some(100);
        let o = PipelineOrchestrator::new(config.clone()).unwrap();
        assert_eq!(o.seed_for_row(3), OutcomeSeed::Explicit(103));

        config.execution_mode = ExecutionMode::Live;
        let o = PipelineOrchestrator::new(config).unwrap();
        assert_eq!(o.seed_for_row(3), OutcomeSeed::Entropy);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TriageConfig {
            confidence_threshold: -0.1,
            ..Default::default()
        };
        assert!(PipelineOrchestrator::new(config).is_err());
    }

    #[test]
    fn test_sort_records_is_idempotent() {
        let o = orchestrator();
        let mk = |volume: u64, confidence: f64| {
            o.process(
                incident(volume, 500.0, 20.0, 1),
                classified(IssueType::AuthTimeout, confidence),
                OutcomeSeed::Explicit(volume),
            )
            .unwrap()
        };
        let mut records: Vec<_> = (1..=12u64)
            .map(|v| mk(v * 10, if v % 3 == 0 { 0.2 } else { 0.9 }))
            .collect();
        sort_records(&mut records);
        let once = records.clone();
        sort_records(&mut records);
        assert_eq!(records, once);

        for pair in records.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let rank = (a.resolution_mode.sort_rank(), b.resolution_mode.sort_rank());
            assert!(rank.0 <= rank.1);
            if rank.0 == rank.1 {
                assert!(a.impact_score >= b.impact_score);
            }
        }
    }
}
