//! Error types for the promptdoc engine
//!
//! Two layers are used: [`ProcessError`] is what callers of the engine see,
//! and [`ProcessingError`] is the severity-graded record the error handler
//! works with. Every `ProcessError` can be lowered into a `ProcessingError`
//! with a stable error code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::Position;
use crate::schema::ValidationIssue;

/// Severity of a processing error, ordered from least to most severe.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

/// A severity-graded error raised while processing a document.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{severity}: {message}")]
pub struct ProcessingError {
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl ProcessingError {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
            code: None,
            position: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Copy of this error with a different severity.
    pub fn escalate(&self, severity: Severity) -> Self {
        Self {
            severity,
            ..self.clone()
        }
    }
}

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Malformed input handed to the engine
    #[error("Invalid markup: {0}")]
    InvalidMarkup(String),

    /// Schema violations that aborted processing
    #[error("Validation failed: {}", .issues.iter().map(|i| i.message.as_str()).collect::<Vec<_>>().join("; "))]
    Validation { issues: Vec<ValidationIssue> },

    /// No protocol handler accepts the reference's protocol
    #[error("Invalid reference: no handler for protocol in '{uri}'")]
    InvalidReference { uri: String },

    /// The handler failed, or the target does not exist
    #[error("Reference not found: {uri}: {source}")]
    ReferenceNotFound {
        uri: String,
        #[source]
        source: Box<ProcessError>,
    },

    /// An `extends` chain loops back on itself
    #[error("Circular reference detected: {uri} (chain: {})", .chain.join(" -> "))]
    CircularReference { uri: String, chain: Vec<String> },

    /// No element with this id was indexed
    #[error("Unknown element id: {0}")]
    UnknownId(String),

    /// Malformed `protocol:path` value
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Severity-graded processing error
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// IO error (file protocol, runtime construction)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP retries exhausted on transient failures
    #[error("HTTP request failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },
}

impl ProcessError {
    /// Stable error code used in metadata and callbacks.
    pub fn code(&self) -> &'static str {
        match self {
            ProcessError::InvalidMarkup(_) => "INVALID_MARKUP",
            ProcessError::Validation { .. } => "VALIDATION_ERROR",
            ProcessError::InvalidReference { .. } => "INVALID_REFERENCE",
            ProcessError::ReferenceNotFound { .. } => "REFERENCE_NOT_FOUND",
            ProcessError::CircularReference { .. } => "CIRCULAR_REFERENCE",
            ProcessError::UnknownId(_) => "UNKNOWN_ID",
            ProcessError::InvalidUri(_) => "INVALID_URI",
            ProcessError::Processing(_) => "PROCESSING_ERROR",
            ProcessError::Io(_) => "IO_ERROR",
            ProcessError::Json(_) => "JSON_ERROR",
            ProcessError::Yaml(_) => "YAML_ERROR",
            ProcessError::Http(_) | ProcessError::RetriesExhausted { .. } => "HTTP_ERROR",
        }
    }

    /// Severity-graded record of this error.
    ///
    /// `Processing` errors keep their own severity and code; everything else
    /// is an `Error` carrying [`ProcessError::code`].
    pub fn to_processing_error(&self) -> ProcessingError {
        match self {
            ProcessError::Processing(err) => err.clone(),
            other => ProcessingError::error(other.to_string()).with_code(other.code()),
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
        assert_eq!("FATAL".parse::<Severity>().unwrap(), Severity::Fatal);
        assert_eq!(Severity::Warning.to_string(), "warning");
    }

    #[test]
    fn test_circular_reference_display() {
        let err = ProcessError::CircularReference {
            uri: "id:el2".to_string(),
            chain: vec!["id:el2".to_string(), "id:el1".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Circular reference detected: id:el2 (chain: id:el2 -> id:el1)"
        );
    }

    #[test]
    fn test_reference_not_found_keeps_cause() {
        let err = ProcessError::ReferenceNotFound {
            uri: "id:missing".to_string(),
            source: Box::new(ProcessError::UnknownId("missing".to_string())),
        };
        assert!(err.to_string().contains("Unknown element id: missing"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_to_processing_error_keeps_severity() {
        let original = ProcessingError::warning("duplicate").with_code("DUPLICATE_ID");
        let lowered = ProcessError::Processing(original.clone()).to_processing_error();
        assert_eq!(lowered, original);

        let lowered = ProcessError::UnknownId("x".to_string()).to_processing_error();
        assert_eq!(lowered.severity, Severity::Error);
        assert_eq!(lowered.code.as_deref(), Some("UNKNOWN_ID"));
    }
}
