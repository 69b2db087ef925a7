//! Configuration for the promptdoc engine
//!
//! Two kinds of configuration live here:
//! - **Limits**: compile-time constants guarding against runaway input
//!   (oversized documents, endless inheritance chains, hanging requests)
//! - **[`ProcessorConfig`]**: the per-processor policy and registries,
//!   built with `with_*` methods or read from the environment
//!
//! # Environment
//!
//! | variable                   | effect                          | default |
//! |----------------------------|---------------------------------|---------|
//! | `PROMPTDOC_STRICT`         | `strict_mode`                   | false   |
//! | `PROMPTDOC_ERROR_RECOVERY` | `error_recovery`                | true    |

use std::sync::Arc;

use crate::error::Result;
use crate::error_handler::{ErrorCallback, ErrorHandler};
use crate::registry::{create_default_registry, TagProcessorRegistry};
use crate::resolver::ReferenceResolver;
use crate::schema::{prompt_schema, TagRegistry};
use crate::visitors::NodeVisitor;

/// Maximum length of an `extends` chain.
///
/// Chains are resolved recursively; this bounds the recursion even when
/// cycle detection is defeated by ever-changing URIs.
pub const MAX_INHERITANCE_DEPTH: usize = 32;

/// Maximum document size in bytes (5 MB), for imported and referenced files.
pub const MAX_DOCUMENT_SIZE: usize = 5_000_000;

/// Per-request timeout for remote references.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for a remote reference.
pub const HTTP_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff between attempts (milliseconds).
pub const HTTP_RETRY_BASE_DELAY_MS: u64 = 500;

/// Configuration for a [`Processor`](crate::processor::Processor).
///
/// The default resolver only handles `id:` and `file:` references; an
/// `http(s):` reference fails with `InvalidReference` until the remote
/// handlers are added with [`ProcessorConfig::with_default_handlers`] or a
/// custom resolver.
#[derive(Clone)]
pub struct ProcessorConfig {
    pub strict_mode: bool,
    pub error_recovery: bool,
    pub on_error: Option<ErrorCallback>,
    pub on_warning: Option<ErrorCallback>,
    /// Schema to validate against; `None` skips validation.
    pub schema: Option<Arc<TagRegistry>>,
    pub tag_processors: Arc<TagProcessorRegistry>,
    pub resolver: Arc<ReferenceResolver>,
    /// Visitors run in addition to the built-in ones.
    pub visitors: Vec<Arc<dyn NodeVisitor>>,
    /// Protocols whose references are resolved lazily by the transform stage.
    pub deferred_protocols: Vec<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            error_recovery: true,
            on_error: None,
            on_warning: None,
            schema: Some(Arc::new(prompt_schema())),
            tag_processors: Arc::new(create_default_registry()),
            resolver: Arc::new(ReferenceResolver::with_local_defaults()),
            visitors: Vec::new(),
            deferred_protocols: Vec::new(),
        }
    }
}

impl ProcessorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the error policy from the environment; everything else keeps
    /// its default.
    pub fn from_env() -> Self {
        let strict_mode = std::env::var("PROMPTDOC_STRICT")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let error_recovery = std::env::var("PROMPTDOC_ERROR_RECOVERY")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(true);

        Self {
            strict_mode,
            error_recovery,
            ..Self::default()
        }
    }

    pub fn with_strict_mode(mut self, strict_mode: bool) -> Self {
        self.strict_mode = strict_mode;
        self
    }

    pub fn with_error_recovery(mut self, error_recovery: bool) -> Self {
        self.error_recovery = error_recovery;
        self
    }

    pub fn with_error_callback(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn with_warning_callback(mut self, callback: ErrorCallback) -> Self {
        self.on_warning = Some(callback);
        self
    }

    pub fn with_schema(mut self, schema: TagRegistry) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    pub fn without_schema(mut self) -> Self {
        self.schema = None;
        self
    }

    pub fn with_tag_processors(mut self, registry: TagProcessorRegistry) -> Self {
        self.tag_processors = Arc::new(registry);
        self
    }

    pub fn with_resolver(mut self, resolver: ReferenceResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Resolve `id`, `file`, `http` and `https` references.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Http` if the HTTP client cannot be built.
    pub fn with_default_handlers(self) -> Result<Self> {
        Ok(self.with_resolver(ReferenceResolver::with_defaults()?))
    }

        pub fn with_visitor(mut self, visitor: Arc<dyn NodeVisitor>) -> Self {
        self.visitors.push(visitor);
        self
    }

    pub fn with_deferred_protocols(mut self, protocols: &[&str]) -> Self {
        self.deferred_protocols = protocols.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Error handler carrying this configuration's policy and callbacks.
    pub fn error_handler(&self) -> ErrorHandler {
        let mut handler = ErrorHandler::new(self.strict_mode, self.error_recovery);
        if let Some(callback) = &self.on_error {
            handler = handler.with_error_callback(callback.clone());
        }
        if let Some(callback) = &self.on_warning {
            handler = handler.with_warning_callback(callback.clone());
        }
        handler
    }
}

impl std::fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("strict_mode", &self.strict_mode)
            .field("error_recovery", &self.error_recovery)
            .field("schema", &self.schema.as_ref().map(|s| s.tag_names().len()))
            .field("tag_processors", &self.tag_processors)
            .field("resolver", &self.resolver)
            .field(
                "visitors",
                &self.visitors.iter().map(|v| v.name()).collect::<Vec<_>>(),
            )
            .field("deferred_protocols", &self.deferred_protocols)
            .finish()
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no" | "off")
}
