//! Classifier seam
//!
//! The engine never trains or runs a model itself. It asks a [`Classifier`]
//! for `(predicted_issue, confidence)` and treats the answer as input.
//!
//! Two implementations ship with the engine:
//!
//! - [`PreClassified`] reads a label an upstream model already attached to
//!   the row, optionally deferring to another classifier when none is there.
//! - [`ErrorCodeClassifier`] maps terminal error-code families to issue types.
//!   Unknown codes come back with low confidence so the confidence gate
//!   routes them to a human.

use crate::error::{TriageError, TriageResult};
use crate::incident::{Classification, Incident, IssueType, RawIncident};
use std::sync::Arc;

/// Source of issue predictions
pub trait Classifier: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Classify one validated incident. `raw` is the row it came from.
    fn classify(&self, incident: &Incident, raw: &RawIncident) -> TriageResult<Classification>;
}

/// Uses the classification carried on the input row
#[derive(Clone, Default)]
pub struct PreClassified {
    fallback: Option<Arc<dyn Classifier>>,
}

impl PreClassified {
    /// Rows without a label are rejected
    pub fn strict() -> Self {
        Self { fallback: None }
    }

    /// Rows without a label are handed to `fallback`
    pub fn with_fallback(fallback: Arc<dyn Classifier>) -> Self {
        Self {
            fallback: Some(fallback),
        }
    }
}

impl std::fmt::Debug for PreClassified {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreClassified")
            .field("fallback", &self.fallback.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

impl Classifier for PreClassified {
    fn name(&self) -> &str {
        "pre-classified"
    }

    fn classify(&self, incident: &Incident, raw: &RawIncident) -> TriageResult<Classification> {
        if let Some(classification) = raw.embedded_classification()? {
            return Ok(classification);
        }
        match &self.fallback {
            Some(fallback) => fallback.classify(incident, raw),
            None => Err(TriageError::missing("predicted_issue")),
        }
    }
}

/// Confidence reported for a recognised error code
pub const KNOWN_CODE_CONFIDENCE: f64 = 0.92;

/// Confidence reported for an unrecognised error code
pub const UNKNOWN_CODE_CONFIDENCE: f64 = 0.35;

/// Deterministic stand-in that classifies by terminal error code
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorCodeClassifier;

impl ErrorCodeClassifier {
    /// Issue type for an error code, if the code belongs to a known family
    pub fn issue_for_code(code: &str) -> Option<IssueType> {
        let issue = match code.trim().to_ascii_uppercase().as_str() {
            "E001" | "E002" | "E003" => IssueType::NetworkFailure,
            "E010" | "E011" | "E012" => IssueType::CardDeclined,
            "E020" | "E021" | "E022" => IssueType::HardwareFault,
            "E030" | "E031" => IssueType::CashOut,
            "E040" | "E041" | "E042" => IssueType::AuthTimeout,
            _ => return None,
        };
        Some(issue)
    }
}

impl Classifier for ErrorCodeClassifier {
    fn name(&self) -> &str {
        "error-code"
    }

    fn classify(&self, incident: &Incident, _raw: &RawIncident) -> TriageResult<Classification> {
        match Self::issue_for_code(&incident.error_code) {
            Some(issue) => Classification::new(issue, KNOWN_CODE_CONFIDENCE),
            None => Classification::new(
                IssueType::Unrecognized("unknown".to_string()),
                UNKNOWN_CODE_CONFIDENCE,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::LooseValue;

    fn raw(code: &str) -> RawIncident {
        RawIncident {
            subject_id: Some("ATM-1042".to_string()),
            location: Some("Delhi Connaught Place".to_string()),
            hour_of_day: Some(LooseValue::Number(11.0)),
            transaction_volume: Some(LooseValue::Number(80.0)),
            avg_amount: Some(LooseValue::Number(1500.0)),
            downtime_minutes: Some(LooseValue::Number(20.0)),
            complaint_count: Some(LooseValue::Number(3.0)),
            error_code: Some(LooseValue::Text(code.to_string())),
            ..Default::default()
        }
    }

    fn classify_with(c: &dyn Classifier, row: RawIncident) -> TriageResult<Classification> {
        let incident = Incident::try_from(row.clone())?;
        c.classify(&incident, &row)
    }

    #[test]
    fn test_error_code_families() {
        let cases = [
            ("E002", IssueType::NetworkFailure),
            ("e011", IssueType::CardDeclined),
            ("E022", IssueType::HardwareFault),
            ("E030", IssueType::CashOut),
            ("E041", IssueType::AuthTimeout),
        ];
        for (code, expected) in cases {
            let c = classify_with(&ErrorCodeClassifier, raw(code)).unwrap();
            assert_eq!(c.predicted_issue, expected, "code {code}");
            assert_eq!(c.confidence, KNOWN_CODE_CONFIDENCE);
        }
    }

    #[test]
    fn test_unknown_code_is_low_confidence() {
        let c = classify_with(&ErrorCodeClassifier, raw("E999")).unwrap();
        assert!(!c.predicted_issue.is_known());
        assert!(c.confidence < 0.40);
    }

    #[test]
    fn test_pre_classified_uses_row_label() {
        let mut row = raw("E001");
        row.predicted_issue = Some("cash_out".to_string());
        row.ml_confidence = Some(LooseValue::Text("0.77".to_string()));
        let c = classify_with(&PreClassified::strict(), row).unwrap();
        assert_eq!(c.predicted_issue, IssueType::CashOut);
        assert_eq!(c.confidence, 0.77);
    }

    #[test]
    fn test_pre_classified_strict_requires_label() {
        let err = classify_with(&PreClassified::strict(), raw("E001")).unwrap_err();
        assert!(err.to_string().contains("predicted_issue"));
    }

    #[test]
    fn test_pre_classified_falls_back() {
        let c = PreClassified::with_fallback(Arc::new(ErrorCodeClassifier));
        let result = classify_with(&c, raw("E020")).unwrap();
        assert_eq!(result.predicted_issue, IssueType::HardwareFault);
    }
}
