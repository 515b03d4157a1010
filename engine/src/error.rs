//! Engine error types
//!
//! Decision failures and durability failures are kept apart: a
//! [`TriageError`] means no record could be produced for an incident, while an
//! [`ArchiveError`] only ever means an already-computed record was not
//! persisted.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations
pub type TriageResult<T> = Result<T, TriageError>;

/// Result type alias for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors that can occur while triaging an incident
#[derive(Error, Debug)]
pub enum TriageError {
    /// Malformed or missing required input field
    #[error("Validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    /// Configuration is out of range or could not be loaded
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Archive write or read failed
    #[error("Persistence failure: {0}")]
    Persistence(#[from] ArchiveError),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl TriageError {
    /// Create a validation error for a named input field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a validation error for a required field that was absent
    pub fn missing(field: impl Into<String>) -> Self {
        Self::validation(field, "required field is missing")
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error was caused by bad input (as opposed to the environment)
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Errors raised by the append-only log archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode log entry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Corrupt archive line {line}: {message}")]
    Decode { line: usize, message: String },

    #[error("Archive schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("Archive writer is closed")]
    WriterClosed,
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A single rejected row in a batch, reported alongside the successful records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    /// Zero-based position of the row in the submitted batch
    pub row_index: usize,
    /// Subject identifier when the row carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    /// Human-readable error
    pub error: String,
}

impl RowError {
    pub fn new(row_index: usize, subject_id: Option<String>, error: &TriageError) -> Self {
        Self {
            row_index,
            subject_id,
            error: error.to_string(),
        }
    }
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subject_id {
            Some(id) => write!(f, "row {} ({}): {}", self.row_index, id, self.error),
            None => write!(f, "row {}: {}", self.row_index, self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_field() {
        let err = TriageError::validation("avg_amount", "must be non-negative");
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Validation error on 'avg_amount': must be non-negative"
        );
    }

    #[test]
    fn test_archive_error_wraps_into_persistence() {
        let err: TriageError = ArchiveError::WriterClosed.into();
        assert!(!err.is_validation());
        assert!(err.to_string().contains("Persistence failure"));
    }

    #[test]
    fn test_row_error_display() {
        let err = TriageError::missing("location");
        let row = RowError::new(3, Some("ATM-1001".to_string()), &err);
        assert_eq!(
            row.to_string(),
            "row 3 (ATM-1001): Validation error on 'location': required field is missing"
        );

        let anonymous = RowError::new(4, None, &err);
        assert!(anonymous.to_string().starts_with("row 4: "));
    }
}
