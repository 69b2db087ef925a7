//! Transformer configuration
//!
//! [`TransformerConfig`] is the transformer's standing policy;
//! [`TransformOptions`] carries per-call overrides and template variables.
//!
//! # Modes
//!
//! | mode   | error handling | error threshold |
//! |--------|----------------|-----------------|
//! | strict | `throw`        | 0               |
//! | loose  | `warn`         | 5               |
//!
//! Both columns can be overridden independently of the mode.
//!
//! # Environment
//!
//! | variable                    | effect            |
//! |-----------------------------|-------------------|
//! | `PROMPTDOC_OUTPUT_FORMAT`   | `output_format`   |
//! | `PROMPTDOC_TRANSFORM_MODE`  | `mode` (+ policy) |
//! | `PROMPTDOC_ERROR_THRESHOLD` | `error_threshold` |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TransformError};

/// Error threshold applied in loose mode unless overridden.
pub const DEFAULT_ERROR_THRESHOLD: usize = 5;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TransformMode {
    Strict,
    #[default]
    Loose,
}

/// What a visitor error does to the run.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ErrorHandling {
    /// Return the error immediately
    Throw,
    /// Log, count and continue
    #[default]
    Warn,
}

/// What happens once the error count exceeds the threshold.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ThresholdAction {
    /// Stop and return the partially transformed document
    #[default]
    AbortTransform,
    /// Drop the offending visitor for the rest of the run
    DisableVisitor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerConfig {
    pub mode: TransformMode,
    pub error_handling: ErrorHandling,
    pub error_threshold: usize,
    pub threshold_action: ThresholdAction,
    /// Default output format, tried after the `outputFormat` context
    /// variable and the document's declared format.
    pub output_format: Option<String>,
    /// Sniff the output format from the document content as a last resort.
    pub infer_format: bool,
    /// Return no output instead of falling back to the generic adapter.
    pub strict_matching: bool,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self::for_mode(TransformMode::Loose)
    }
}

impl TransformerConfig {
    /// Policy defaults for a mode.
    pub fn for_mode(mode: TransformMode) -> Self {
        let (error_handling, error_threshold) = match mode {
            TransformMode::Strict => (ErrorHandling::Throw, 0),
            TransformMode::Loose => (ErrorHandling::Warn, DEFAULT_ERROR_THRESHOLD),
        };
        Self {
            mode,
            error_handling,
            error_threshold,
            threshold_action: ThresholdAction::default(),
            output_format: None,
            infer_format: false,
            strict_matching: false,
        }
    }

    pub fn strict() -> Self {
        Self::for_mode(TransformMode::Strict)
    }

    pub fn loose() -> Self {
        Self::for_mode(TransformMode::Loose)
    }

    /// # Errors
    ///
    /// Returns `TransformError::Config` for an unrecognised mode or a
    /// non-numeric threshold.
    pub fn from_env() -> Result<Self> {
        let mode = match std::env::var("PROMPTDOC_TRANSFORM_MODE") {
            Ok(value) => value
                .parse::<TransformMode>()
                .map_err(|_| TransformError::Config(format!("invalid transform mode: {value}")))?,
            Err(_) => TransformMode::default(),
        };
        let mut config = Self::for_mode(mode);

        if let Ok(value) = std::env::var("PROMPTDOC_ERROR_THRESHOLD") {
            config.error_threshold = value.trim().parse().map_err(|_| {
                TransformError::Config(format!("invalid error threshold: {value}"))
            })?;
        }

        config.output_format = std::env::var("PROMPTDOC_OUTPUT_FORMAT")
            .ok()
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());

        Ok(config)
    }

    pub fn with_error_handling(mut self, error_handling: ErrorHandling) -> Self {
        self.error_handling = error_handling;
        self
    }

    pub fn with_error_threshold(mut self, threshold: usize) -> Self {
        self.error_threshold = threshold;
        self
    }

    pub fn with_threshold_action(mut self, action: ThresholdAction) -> Self {
        self.threshold_action = action;
        self
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = Some(format.into());
        self
    }

    pub fn with_format_inference(mut self, infer: bool) -> Self {
        self.infer_format = infer;
        self
    }

    pub fn with_strict_matching(mut self, strict: bool) -> Self {
        self.strict_matching = strict;
        self
    }

    /// Effective configuration for one call.
    ///
    /// A mode override resets error handling and threshold to that mode's
    /// defaults before the explicit overrides apply. The requested format
    /// stays on the options and is not folded into `output_format`.
    pub fn apply(&self, options: &TransformOptions) -> Self {
        let mut config = match options.mode {
            Some(mode) if mode != self.mode => Self {
                output_format: self.output_format.clone(),
                infer_format: self.infer_format,
                strict_matching: self.strict_matching,
                threshold_action: self.threshold_action,
                ..Self::for_mode(mode)
            },
            _ => self.clone(),
        };
        if let Some(threshold) = options.error_threshold {
            config.error_threshold = threshold;
        }
        if let Some(action) = options.threshold_action {
            config.threshold_action = action;
        }
        config
    }
}

/// Per-call transform options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOptions {
    /// Requested output format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TransformMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_threshold: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_action: Option<ThresholdAction>,
    /// Template variables; these shadow the processing-stage variables.
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_mode(mut self, mode: TransformMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_error_threshold(mut self, threshold: usize) -> Self {
        self.error_threshold = Some(threshold);
        self
    }

    pub fn with_threshold_action(mut self, action: ThresholdAction) -> Self {
        self.threshold_action = Some(action);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mode_defaults() {
        let strict = TransformerConfig::strict();
        assert_eq!(strict.error_handling, ErrorHandling::Throw);
        assert_eq!(strict.error_threshold, 0);

        let loose = TransformerConfig::default();
        assert_eq!(loose.mode, TransformMode::Loose);
        assert_eq!(loose.error_handling, ErrorHandling::Warn);
        assert_eq!(loose.error_threshold, DEFAULT_ERROR_THRESHOLD);
    }

    #[test]
    fn test_enum_names() {
        assert_eq!(
            "disable-visitor".parse::<ThresholdAction>().unwrap(),
            ThresholdAction::DisableVisitor
        );
        assert_eq!(ThresholdAction::AbortTransform.to_string(), "abort-transform");
        assert_eq!("STRICT".parse::<TransformMode>().unwrap(), TransformMode::Strict);
        assert!("lenient".parse::<TransformMode>().is_err());
    }

    #[test]
    fn test_apply_mode_override() {
        let base = TransformerConfig::loose()
            .with_output_format("markdown")
            .with_threshold_action(ThresholdAction::DisableVisitor);
        let config = base.apply(&TransformOptions::new().with_mode(TransformMode::Strict));

        assert_eq!(config.error_handling, ErrorHandling::Throw);
        assert_eq!(config.error_threshold, 0);
        assert_eq!(config.output_format.as_deref(), Some("markdown"));
        assert_eq!(config.threshold_action, ThresholdAction::DisableVisitor);
    }

    #[test]
    fn test_apply_explicit_overrides() {
        let config = TransformerConfig::default().apply(
            &TransformOptions::new()
                .with_format("json")
                .with_error_threshold(3)
                .with_threshold_action(ThresholdAction::DisableVisitor),
        );
        assert_eq!(config.error_threshold, 3);
        assert_eq!(config.threshold_action, ThresholdAction::DisableVisitor);
        assert_eq!(config.output_format, None);
    }

    #[test]
    fn test_options_deserialize() {
        let options: TransformOptions = serde_json::from_str(
            r#"{"format": "xml", "mode": "strict", "thresholdAction": "disable-visitor",
                "variables": {"user": "Ada"}}"#,
        )
        .unwrap();
        assert_eq!(options.format.as_deref(), Some("xml"));
        assert_eq!(options.mode, Some(TransformMode::Strict));
        assert_eq!(options.threshold_action, Some(ThresholdAction::DisableVisitor));
        assert_eq!(options.variables["user"], serde_json::json!("Ada"));
    }
}
