//! Incident model: raw rows, validated incidents and classifications
//!
//! Rows arrive loosely typed (CSV exports and hand-written JSONL both show up
//! in practice), so [`RawIncident`] accepts numbers or numeric strings and
//! defers every check to [`Incident::try_from`]. A validated [`Incident`] is
//! never mutated after construction.

use crate::error::{TriageError, TriageResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// Issue types
// ============================================================================

/// Closed set of payment-terminal issue types produced by the classifier.
///
/// Any label outside the known five parses to [`IssueType::Unrecognized`]
/// rather than failing; downstream lookups resolve it to their fallback entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IssueType {
    NetworkFailure,
    CardDeclined,
    HardwareFault,
    CashOut,
    AuthTimeout,
    Unrecognized(String),
}

impl IssueType {
    /// The five issue types the rule and playbook tables know about
    pub const KNOWN: [IssueType; 5] = [
        IssueType::NetworkFailure,
        IssueType::CardDeclined,
        IssueType::HardwareFault,
        IssueType::CashOut,
        IssueType::AuthTimeout,
    ];

    /// Parse a classifier label. Total: never fails.
    pub fn parse(label: &str) -> Self {
        match label.trim() {
            "network_failure" => Self::NetworkFailure,
            "card_declined" => Self::CardDeclined,
            "hardware_fault" => Self::HardwareFault,
            "cash_out" => Self::CashOut,
            "auth_timeout" => Self::AuthTimeout,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Wire label for this issue type
    pub fn as_str(&self) -> &str {
        match self {
            Self::NetworkFailure => "network_failure",
            Self::CardDeclined => "card_declined",
            Self::HardwareFault => "hardware_fault",
            Self::CashOut => "cash_out",
            Self::AuthTimeout => "auth_timeout",
            Self::Unrecognized(label) => label,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for IssueType {
    fn from(label: String) -> Self {
        Self::parse(&label)
    }
}

impl From<IssueType> for String {
    fn from(issue: IssueType) -> Self {
        issue.as_str().to_string()
    }
}

impl std::str::FromStr for IssueType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Output of the external classifier for one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Predicted issue type
    pub predicted_issue: IssueType,
    /// Highest class probability, in [0, 1]
    pub confidence: f64,
}

impl Classification {
    /// Build a classification, rejecting confidences outside [0, 1]
    pub fn new(predicted_issue: IssueType, confidence: f64) -> TriageResult<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(TriageError::validation(
                "ml_confidence",
                format!("must be within [0, 1], got {confidence}"),
            ));
        }
        Ok(Self {
            predicted_issue,
            confidence,
        })
    }
}

// ============================================================================
// Raw rows
// ============================================================================

/// A field value as it appears in an input row: numeric or textual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseValue {
    Number(f64),
    Text(String),
}

impl LooseValue {
    fn as_number(&self, field: &str) -> TriageResult<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                TriageError::validation(field, format!("expected a number, got '{s}'"))
            })?,
        };
        if !value.is_finite() {
            return Err(TriageError::validation(field, "must be a finite number"));
        }
        Ok(value)
    }

    fn as_text(&self) -> String {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

/// Unvalidated input row. Every field is optional so that a single malformed
/// row can be reported without failing the whole batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawIncident {
    #[serde(default, alias = "atm_id")]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub hour_of_day: Option<LooseValue>,
    #[serde(default)]
    pub transaction_volume: Option<LooseValue>,
    #[serde(default)]
    pub avg_amount: Option<LooseValue>,
    #[serde(default)]
    pub downtime_minutes: Option<LooseValue>,
    #[serde(default)]
    pub complaint_count: Option<LooseValue>,
    #[serde(default)]
    pub error_code: Option<LooseValue>,
    /// Present when an upstream classifier already labelled the row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml_confidence: Option<LooseValue>,
}

impl RawIncident {
    /// Subject id, if the row carried a non-blank one
    pub fn subject_hint(&self) -> Option<String> {
        self.subject_id
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Classification carried on the row itself, if any
    pub fn embedded_classification(&self) -> TriageResult<Option<Classification>> {
        let Some(label) = self.predicted_issue.as_deref() else {
            return Ok(None);
        };
        let confidence = match &self.ml_confidence {
            Some(v) => v.as_number("ml_confidence")?,
            None => return Err(TriageError::missing("ml_confidence")),
        };
        Classification::new(IssueType::parse(label), confidence).map(Some)
    }
}

// ============================================================================
// Validated incident
// ============================================================================

/// One reported payment-terminal failure with its contextual metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub subject_id: String,
    pub location: String,
    pub hour_of_day: u8,
    pub transaction_volume: u64,
    pub avg_amount: f64,
    /// May be zero or negative as reported; scoring clamps it to one minute
    pub downtime_minutes: f64,
    pub complaint_count: u32,
    pub error_code: String,
}

impl Incident {
    /// Canonical identity string, used to derive a per-incident outcome seed.
    ///
    /// Two incidents collide only if every input field matches.
    pub fn identity_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{:.4}|{:.4}|{}|{}",
            self.subject_id,
            self.location,
            self.hour_of_day,
            self.transaction_volume,
            self.avg_amount,
            self.downtime_minutes,
            self.complaint_count,
            self.error_code
        )
    }
}

fn required<'a, T>(value: &'a Option<T>, field: &str) -> TriageResult<&'a T> {
    value.as_ref().ok_or_else(|| TriageError::missing(field))
}

fn required_text(value: &Option<String>, field: &str) -> TriageResult<String> {
    let text = required(value, field)?.trim().to_string();
    if text.is_empty() {
        return Err(TriageError::validation(field, "must not be blank"));
    }
    Ok(text)
}

fn whole_number(value: f64, field: &str, max: f64) -> TriageResult<f64> {
    if value < 0.0 {
        return Err(TriageError::validation(
            field,
            format!("must be non-negative, got {value}"),
        ));
    }
    if value.fract() != 0.0 {
        return Err(TriageError::validation(
            field,
            format!("must be a whole number, got {value}"),
        ));
    }
    if value > max {
        return Err(TriageError::validation(
            field,
            format!("must be at most {max}, got {value}"),
        ));
    }
    Ok(value)
}

impl TryFrom<RawIncident> for Incident {
    type Error = TriageError;

    fn try_from(raw: RawIncident) -> TriageResult<Self> {
        let subject_id = required_text(&raw.subject_id, "subject_id")?;
        let location = required_text(&raw.location, "location")?;

        let hour = required(&raw.hour_of_day, "hour_of_day")?.as_number("hour_of_day")?;
        let hour = whole_number(hour, "hour_of_day", 23.0)?;

        let volume = required(&raw.transaction_volume, "transaction_volume")?
            .as_number("transaction_volume")?;
        let volume = whole_number(volume, "transaction_volume", u64::MAX as f64)?;

        let avg_amount = required(&raw.avg_amount, "avg_amount")?.as_number("avg_amount")?;
        if avg_amount < 0.0 {
            return Err(TriageError::validation(
                "avg_amount",
                format!("must be non-negative, got {avg_amount}"),
            ));
        }

        let downtime_minutes =
            required(&raw.downtime_minutes, "downtime_minutes")?.as_number("downtime_minutes")?;

        let complaints =
            required(&raw.complaint_count, "complaint_count")?.as_number("complaint_count")?;
        let complaints = whole_number(complaints, "complaint_count", u32::MAX as f64)?;

        let error_code = required(&raw.error_code, "error_code")?.as_text();
        if error_code.is_empty() {
            return Err(TriageError::validation("error_code", "must not be blank"));
        }

        Ok(Self {
            subject_id,
            location,
            hour_of_day: hour as u8,
            transaction_volume: volume as u64,
            avg_amount,
            downtime_minutes,
            complaint_count: complaints as u32,
            error_code,
        })
    }
}
