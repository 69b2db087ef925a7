//! Severity-graded error policy.
//!
//! | severity | strict            | loose + recovery | loose, no recovery |
//! |----------|-------------------|------------------|--------------------|
//! | warning  | warning callback  | warning callback | warning callback   |
//! | error    | escalated, aborts | error callback   | error callback, aborts |
//! | fatal    | aborts            | aborts           | aborts             |

use std::fmt;
use std::sync::Arc;

use crate::ast::Element;
use crate::context::DocumentMode;
use crate::error::{ProcessError, ProcessingError, Result, Severity};

/// Callback invoked with every error or warning the handler sees.
pub type ErrorCallback = Arc<dyn Fn(&ProcessingError) + Send + Sync>;

/// Applies the strict/loose policy to processing errors.
#[derive(Clone, Default)]
pub struct ErrorHandler {
    strict_mode: bool,
    error_recovery: bool,
    on_error: Option<ErrorCallback>,
    on_warning: Option<ErrorCallback>,
}

impl ErrorHandler {
    pub fn new(strict_mode: bool, error_recovery: bool) -> Self {
        Self {
            strict_mode,
            error_recovery,
            on_error: None,
            on_warning: None,
        }
    }

    pub fn with_error_callback(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn with_warning_callback(mut self, callback: ErrorCallback) -> Self {
        self.on_warning = Some(callback);
        self
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    pub fn error_recovery(&self) -> bool {
        self.error_recovery
    }

    /// Apply the handler's own policy.
    ///
    /// Returns the recorded error (with its effective severity) when
    /// processing may continue.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Processing` when the error aborts processing.
    pub fn handle(&self, error: ProcessingError) -> Result<ProcessingError> {
        self.handle_with_strictness(error, self.strict_mode)
    }

    /// Apply the policy derived from the element's own `mode` attribute,
    /// falling back to the declared document mode and then to the handler's
    /// `strict_mode`.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Processing` when the error aborts processing.
    pub fn handle_with_context(
        &self,
        error: ProcessingError,
        element: Option<&Element>,
        document_mode: Option<DocumentMode>,
    ) -> Result<ProcessingError> {
        let element_mode = element
            .and_then(|e| e.attribute_str("mode"))
            .and_then(|m| m.parse::<DocumentMode>().ok());

        let strict = match element_mode.or(document_mode) {
            Some(mode) => mode == DocumentMode::Strict,
            None => self.strict_mode,
        };

        let error = match (error.position, element) {
            (None, Some(element)) => error.with_position(element.position),
            _ => error,
        };

        self.handle_with_strictness(error, strict)
    }

    fn handle_with_strictness(&self, error: ProcessingError, strict: bool) -> Result<ProcessingError> {
        let error = if error.severity == Severity::Error && strict {
            error.escalate(Severity::Fatal)
        } else {
            error
        };

        match error.severity {
            Severity::Fatal => {
                tracing::error!(code = ?error.code, message = %error.message, "Fatal processing error");
                self.notify_error(&error);
                Err(ProcessError::Processing(error))
            }
            Severity::Error => {
                self.notify_error(&error);
                if !self.error_recovery {
                    tracing::error!(code = ?error.code, message = %error.message, "Processing error, recovery disabled");
                    return Err(ProcessError::Processing(error));
                }
                tracing::warn!(code = ?error.code, message = %error.message, "Recovered from processing error");
                Ok(error)
            }
            Severity::Warning => {
                tracing::debug!(code = ?error.code, message = %error.message, "Processing warning");
                if let Some(callback) = &self.on_warning {
                    callback(&error);
                }
                Ok(error)
            }
        }
    }

    fn notify_error(&self, error: &ProcessingError) {
        if let Some(callback) = &self.on_error {
            callback(error);
        }
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("strict_mode", &self.strict_mode)
            .field("error_recovery", &self.error_recovery)
            .field("has_error_callback", &self.on_error.is_some())
            .field("has_warning_callback", &self.on_warning.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (ErrorCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let callback: ErrorCallback = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (callback, count)
    }

    #[test]
    fn test_fatal_always_aborts() {
        let (callback, count) = counting();
        let handler = ErrorHandler::new(false, true).with_error_callback(callback);
        assert!(handler.handle(ProcessingError::fatal("boom")).is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_escalates_in_strict_mode() {
        let handler = ErrorHandler::new(true, true);
        match handler.handle(ProcessingError::error("bad")) {
            Err(ProcessError::Processing(err)) => assert_eq!(err.severity, Severity::Fatal),
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn test_error_recovered_when_loose() {
        let (callback, count) = counting();
        let handler = ErrorHandler::new(false, true).with_error_callback(callback);
        let recorded = handler.handle(ProcessingError::error("bad")).unwrap();
        assert_eq!(recorded.severity, Severity::Error);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let handler = ErrorHandler::new(false, false);
        assert!(handler.handle(ProcessingError::error("bad")).is_err());
    }

    #[test]
    fn test_warning_only_fires_warning_callback() {
        let (on_error, errors) = counting();
        let (on_warning, warnings) = counting();
        let handler = ErrorHandler::new(true, false)
            .with_error_callback(on_error)
            .with_warning_callback(on_warning);

        assert!(handler.handle(ProcessingError::warning("meh")).is_ok());
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_context_precedence() {
        let handler = ErrorHandler::new(true, true);
        let loose_element = Element::new("task").with_attribute("mode", "loose");

        // Element mode beats document mode beats handler policy
        assert!(handler
            .handle_with_context(
                ProcessingError::error("x"),
                Some(&loose_element),
                Some(DocumentMode::Strict)
            )
            .is_ok());
        assert!(handler
            .handle_with_context(ProcessingError::error("x"), None, Some(DocumentMode::Loose))
            .is_ok());
        assert!(handler
            .handle_with_context(ProcessingError::error("x"), None, None)
            .is_err());
    }
}
