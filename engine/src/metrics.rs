//! Batch automation metrics
//!
//! A pure read over completed [`ResolutionRecord`]s. Percentages are taken
//! against the batch total and rounded to one decimal; an empty batch yields
//! all-zero metrics rather than an error.

use crate::impact::{round1, round2};
use crate::record::{ResolutionMode, ResolutionRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default technician minutes for one manual diagnostic cycle
pub const DEFAULT_MANUAL_BASELINE_MINUTES: u32 = 120;

/// A subject that appears more than once in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatSubject {
    pub subject_id: String,
    pub count: usize,
}

/// Aggregated KPIs for one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationMetrics {
    pub total_incidents: usize,
    pub auto_resolved_count: usize,
    pub auto_attempted_count: usize,
    pub manual_required_count: usize,

    pub auto_resolved_pct: f64,
    pub auto_attempted_pct: f64,
    pub manual_required_pct: f64,

    /// Mean automation time over AUTO_RESOLVED records only
    pub avg_auto_time_sec: f64,
    /// Share of incidents that no longer needed a human
    pub manual_reduction_pct: f64,

    pub downtime_saved_minutes: u64,
    /// Sum of impact over AUTO_RESOLVED records (₹)
    pub revenue_auto_contained: f64,

    pub repeat_subject_count: usize,
    /// Sorted by count descending, then subject id
    pub repeat_subjects: Vec<RepeatSubject>,
    pub low_confidence_count: usize,
}

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(part as f64 / total as f64 * 100.0)
}

/// Subjects occurring more than once, most frequent first
pub fn repeat_subjects<'a, I>(subject_ids: I) -> Vec<RepeatSubject>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for id in subject_ids {
        *counts.entry(id).or_default() += 1;
    }
    let mut repeats: Vec<RepeatSubject> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, count)| RepeatSubject {
            subject_id: id.to_string(),
            count,
        })
        .collect();
    repeats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.subject_id.cmp(&b.subject_id)));
    repeats
}

impl AutomationMetrics {
    /// Aggregate a batch of records
    pub fn from_records(records: &[ResolutionRecord], manual_baseline_minutes: u32) -> Self {
        let total = records.len();
        if total == 0 {
            return Self::default();
        }

        let count = |mode: ResolutionMode| {
            records
                .iter()
                .filter(|r| r.resolution_mode == mode)
                .count()
        };
        let resolved = count(ResolutionMode::AutoResolved);
        let attempted = count(ResolutionMode::AutoAttempted);
        let manual = count(ResolutionMode::ManualRequired);

        let resolved_records = || {
            records
                .iter()
                .filter(|r| r.resolution_mode == ResolutionMode::AutoResolved)
        };
        let avg_auto_time_sec = if resolved > 0 {
            let sum: f64 = resolved_records().map(|r| r.auto_resolution_time_sec).sum();
            round1(sum / resolved as f64)
        } else {
            0.0
        };
        let revenue: f64 = resolved_records().map(|r| r.impact_score).sum();

        let humans_needed = manual + attempted;
        let manual_reduction_pct = pct(total - humans_needed, total);

        let repeats = repeat_subjects(records.iter().map(|r| r.subject_id()));

        Self {
            total_incidents: total,
            auto_resolved_count: resolved,
            auto_attempted_count: attempted,
            manual_required_count: manual,
            auto_resolved_pct: pct(resolved, total),
            auto_attempted_pct: pct(attempted, total),
            manual_required_pct: pct(manual, total),
            avg_auto_time_sec,
            manual_reduction_pct,
            downtime_saved_minutes: resolved as u64 * u64::from(manual_baseline_minutes),
            revenue_auto_contained: round2(revenue),
            repeat_subject_count: repeats.len(),
            repeat_subjects: repeats,
            low_confidence_count: records.iter().filter(|r| r.is_low_confidence()).count(),
        }
    }

    /// Every record falls in exactly one resolution mode
    pub fn partition_holds(&self) -> bool {
        self.auto_resolved_count + self.auto_attempted_count + self.manual_required_count
            == self.total_incidents
    }

    /// Format as a markdown report
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("# Automation Report\n\n");

        report.push_str("## Resolution Modes\n\n");
        report.push_str(&format!(
            "| Mode | Count | Share |\n\
             |------|-------|-------|\n\
             | AUTO_RESOLVED | {} | {:.1}% |\n\
             | AUTO_ATTEMPTED | {} | {:.1}% |\n\
             | MANUAL_REQUIRED | {} | {:.1}% |\n\
             | **Total** | {} | |\n\n",
            self.auto_resolved_count,
            self.auto_resolved_pct,
            self.auto_attempted_count,
            self.auto_attempted_pct,
            self.manual_required_count,
            self.manual_required_pct,
            self.total_incidents
        ));

        report.push_str("## Operational Impact\n\n");
        report.push_str(&format!(
            "- Manual workload reduction: {:.1}%\n\
             - Avg auto-resolution time: {:.1}s\n\
             - Technician downtime saved: {} min\n\
             - Revenue auto-contained: ₹{:.2}\n\
             - Low-confidence predictions routed to humans: {}\n\n",
            self.manual_reduction_pct,
            self.avg_auto_time_sec,
            self.downtime_saved_minutes,
            self.revenue_auto_contained,
            self.low_confidence_count
        ));

        if !self.repeat_subjects.is_empty() {
            report.push_str(&format!(
                "## Repeat Terminals ({})\n\n",
                self.repeat_subject_count
            ));
            report.push_str("| Terminal | Incidents |\n|----------|-----------|\n");
            for repeat in &self.repeat_subjects {
                report.push_str(&format!("| {} | {} |\n", repeat.subject_id, repeat.count));
            }
            report.push('\n');
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateCheck;
    use crate::impact::Severity;
    use crate::incident::{Incident, IssueType};
    use chrono::Utc;

    fn record(id: &str, mode: ResolutionMode, impact: f64) -> ResolutionRecord {
        let executed = mode != ResolutionMode::ManualRequired;
        ResolutionRecord {
            incident: Incident {
                subject_id: id.to_string(),
                location: "Mumbai Central".to_string(),
                hour_of_day: 10,
                transaction_volume: 50,
                avg_amount: 1000.0,
                downtime_minutes: 30.0,
                complaint_count: 2,
                error_code: "E001".to_string(),
            },
            predicted_issue: IssueType::NetworkFailure,
            ml_confidence: 0.9,
            impact_score: impact,
            severity: Severity::from_score(impact),
            recommended_action: String::new(),
            sla_minutes: 30,
            responsible_team: "Network Operations".to_string(),
            escalation_status: String::new(),
            is_escalated: false,
            resolution_mode: mode,
            eligibility_reason: String::new(),
            blocked_by: None,
            automation_log: String::new(),
            auto_resolution_time_sec: if executed { 45.0 } else { 0.0 },
            steps_executed: Vec::new(),
            outcome_seed: None,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_batch_is_all_zero() {
        let m = AutomationMetrics::from_records(&[], DEFAULT_MANUAL_BASELINE_MINUTES);
        assert_eq!(m, AutomationMetrics::default());
        assert!(m.partition_holds());
    }

    #[test]
    fn test_counts_and_kpis() {
        let records = vec![
            record("ATM-1", ResolutionMode::AutoResolved, 10_000.0),
            record("ATM-2", ResolutionMode::AutoResolved, 5_000.25),
            record("ATM-3", ResolutionMode::AutoAttempted, 7_000.0),
            record("ATM-1", ResolutionMode::ManualRequired, 200_000.0),
        ];
        let m = AutomationMetrics::from_records(&records, DEFAULT_MANUAL_BASELINE_MINUTES);

        assert_eq!(m.total_incidents, 4);
        assert_eq!(m.auto_resolved_count, 2);
        assert_eq!(m.auto_resolved_pct, 50.0);
        assert_eq!(m.auto_attempted_pct, 25.0);
        assert_eq!(m.manual_required_pct, 25.0);
        assert_eq!(m.manual_reduction_pct, 50.0);
        assert_eq!(m.avg_auto_time_sec, 45.0);
        assert_eq!(m.downtime_saved_minutes, 240);
        assert_eq!(m.revenue_auto_contained, 15_000.25);
        assert_eq!(
            m.repeat_subjects,
            vec![RepeatSubject {
                subject_id: "ATM-1".to_string(),
                count: 2
            }]
        );
        assert!(m.partition_holds());
    }

    #[test]
    fn test_low_confidence_uses_blocked_by() {
        let mut low = record("ATM-9", ResolutionMode::ManualRequired, 100.0);
        low.blocked_by = Some(GateCheck::Confidence);
        let mut escalated = record("ATM-8", ResolutionMode::ManualRequired, 100.0);
        escalated.blocked_by = Some(GateCheck::Escalation);

        let m = AutomationMetrics::from_records(&[low, escalated], 120);
        assert_eq!(m.low_confidence_count, 1);
        assert_eq!(m.avg_auto_time_sec, 0.0);
    }

    #[test]
    fn test_repeat_subjects_sorted_by_count_then_id() {
        let ids = ["B", "A", "C", "B", "A", "B", "D"];
        let repeats = repeat_subjects(ids.iter().copied());
        let flat: Vec<(&str, usize)> = repeats
            .iter()
            .map(|r| (r.subject_id.as_str(), r.count))
            .collect();
        assert_eq!(flat, [("B", 3), ("A", 2)]);
    }

    #[test]
    fn prop_percentages_sum_to_hundred() {
        let modes = ResolutionMode::ALL;
        for n in 1..=13usize {
            for offset in 0..3 {
                let records: Vec<_> = (0..n)
                    .map(|i| record(&format!("ATM-{i}"), modes[(i * (offset + 1)) % 3], 1.0))
                    .collect();
                let m = AutomationMetrics::from_records(&records, 120);
                let sum = m.auto_resolved_pct + m.auto_attempted_pct + m.manual_required_pct;
                assert!((sum - 100.0).abs() <= 0.2, "n={n} offset={offset} sum={sum}");
                assert_eq!(m.downtime_saved_minutes, m.auto_resolved_count as u64 * 120);
                assert!(m.partition_holds());
            }
        }
    }

    #[test]
    fn test_report_mentions_repeats() {
        let records = vec![
            record("ATM-7", ResolutionMode::AutoResolved, 1.0),
            record("ATM-7", ResolutionMode::AutoAttempted, 1.0),
        ];
        let report = AutomationMetrics::from_records(&records, 120).format_report();
        assert!(report.starts_with("# Automation Report"));
        assert!(report.contains("| ATM-7 | 2 |"));
        assert!(report.contains("Technician downtime saved: 120 min"));
    }
}
