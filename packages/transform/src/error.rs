//! Error types for the transform stage

use promptdoc_engine::ProcessError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    /// Failure inside the processing stage (including deferred references)
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// A transform-time tag processor failed on an element
    #[error("Tag processor '{processor}' failed on <{tag}>: {message}")]
    TagProcessor {
        processor: String,
        tag: String,
        message: String,
    },

    /// A visitor failed for a reason of its own
    #[error("Visitor '{visitor}' failed: {message}")]
    Visitor { visitor: String, message: String },

    /// Template variable without value or default
    #[error("Missing template variable: {0}")]
    MissingVariable(String),

    /// No adapter registered under the requested format
    #[error("No output adapter for format '{0}'")]
    AdapterNotFound(String),

    /// Rendering the output failed
    #[error("Rendering {format} output failed: {message}")]
    Render { format: String, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransformError {
    /// Stable error code used in `meta.errors` and transform outcomes.
    pub fn code(&self) -> &'static str {
        match self {
            TransformError::Process(err) => err.code(),
            TransformError::TagProcessor { .. } => "TAG_PROCESSOR_ERROR",
            TransformError::Visitor { .. } => "VISITOR_ERROR",
            TransformError::MissingVariable(_) => "MISSING_VARIABLE",
            TransformError::AdapterNotFound(_) => "ADAPTER_NOT_FOUND",
            TransformError::Render { .. } => "RENDER_ERROR",
            TransformError::Config(_) => "CONFIG_ERROR",
            TransformError::Json(_) => "JSON_ERROR",
            TransformError::Yaml(_) => "YAML_ERROR",
            TransformError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for transform operations
pub type Result<T> = std::result::Result<T, TransformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_pass_through_engine_errors() {
        let err: TransformError = ProcessError::UnknownId("x".to_string()).into();
        assert_eq!(err.code(), "UNKNOWN_ID");
        assert_eq!(err.to_string(), "Unknown element id: x");
    }

    #[test]
    fn test_missing_variable_display() {
        let err = TransformError::MissingVariable("user".to_string());
        assert_eq!(err.code(), "MISSING_VARIABLE");
        assert_eq!(err.to_string(), "Missing template variable: user");
    }
}
