//! Reference resolver
//!
//! Dispatches references to protocol handlers and caches the results in the
//! per-document [`ProcessingContext`].
//!
//! # Handler selection
//!
//! Handlers are kept in registration order and scanned in reverse, so a
//! later registration overrides an earlier one for the same protocol:
//!
//! ```ignore
//! let mut resolver = ReferenceResolver::with_local_defaults();
//! resolver.register(Arc::new(MyFileHandler)); // now handles `file:`
//! ```
//!
//! # Caching
//!
//! Results are cached under `protocol:path` for the lifetime of one context.
//! Nothing is shared between documents.

use std::sync::Arc;

use serde_json::Value;

use crate::ast::Reference;
use crate::context::ProcessingContext;
use crate::error::{ProcessError, Result};
use crate::protocols::{FileProtocolHandler, HttpProtocolHandler, IdProtocolHandler, ProtocolHandler};

/// Result of resolving one reference.
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub reference: Reference,
    pub value: Value,
    /// Whether the value came from the context cache.
    pub cached: bool,
}

/// Ordered collection of protocol handlers.
///
/// Immutable once built; share it between documents behind an `Arc`.
#[derive(Clone, Default)]
pub struct ReferenceResolver {
    handlers: Vec<Arc<dyn ProtocolHandler>>,
}

impl ReferenceResolver {
    /// Create a resolver with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver with the `id` and `file` handlers.
    pub fn with_local_defaults() -> Self {
        let mut resolver = Self::new();
        resolver.register(Arc::new(IdProtocolHandler));
        resolver.register(Arc::new(FileProtocolHandler::new()));
        resolver
    }

    /// Resolver with the `id`, `file`, `http` and `https` handlers.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Http` if the HTTP client cannot be built.
    pub fn with_defaults() -> Result<Self> {
        let mut resolver = Self::with_local_defaults();
        resolver.register(Arc::new(HttpProtocolHandler::new()?));
        Ok(resolver)
    }

    /// Add a handler. It takes precedence over earlier handlers.
    pub fn register(&mut self, handler: Arc<dyn ProtocolHandler>) {
        tracing::debug!(handler = handler.name(), "Registered protocol handler");
        self.handlers.push(handler);
    }

    /// Most recently registered handler that accepts `protocol`.
    pub fn get_protocol_handler(&self, protocol: &str) -> Option<&Arc<dyn ProtocolHandler>> {
        let protocol = protocol.to_ascii_lowercase();
        self.handlers.iter().rev().find(|h| h.can_handle(&protocol))
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Resolve a reference, consulting and filling the context cache.
    ///
    /// # Errors
    ///
    /// - `InvalidReference` when no handler accepts the protocol
    /// - `ReferenceNotFound` when the handler fails, carrying the cause
    pub async fn resolve(
        &self,
        reference: &Reference,
        context: &mut ProcessingContext,
    ) -> Result<ResolvedReference> {
        let key = reference.uri();

        if let Some(hit) = context.cached_reference(&key) {
            tracing::trace!(uri = %key, "Reference cache hit");
            return Ok(ResolvedReference {
                reference: reference.clone(),
                value: hit.value.clone(),
                cached: true,
            });
        }

        let handler = self
            .get_protocol_handler(&reference.protocol)
            .ok_or_else(|| ProcessError::InvalidReference { uri: key.clone() })?;

        tracing::debug!(uri = %key, handler = handler.name(), "Resolving reference");
        let value = match handler.handle(reference, context).await {
            Ok(value) => value,
            Err(err @ ProcessError::ReferenceNotFound { .. }) => return Err(err),
            Err(err) => {
                tracing::debug!(uri = %key, error = %err, "Reference handler failed");
                return Err(ProcessError::ReferenceNotFound {
                    uri: key,
                    source: Box::new(err),
                });
            }
        };

        context.cache_reference(key, value.clone());
        Ok(ResolvedReference {
            reference: reference.clone(),
            value,
            cached: false,
        })
    }
}

impl std::fmt::Debug for ReferenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResolver")
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Element;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        value: Value,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProtocolHandler for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn can_handle(&self, protocol: &str) -> bool {
            protocol == "mem"
        }

        async fn handle(&self, _reference: &Reference, _context: &ProcessingContext) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.clone())
        }
    }

    fn fixed(name: &'static str, value: Value) -> (Arc<Fixed>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Fixed {
            name,
            value,
            calls: calls.clone(),
        });
        (handler, calls)
    }

    #[tokio::test]
    async fn test_later_registration_wins() {
        let mut resolver = ReferenceResolver::new();
        let (first, _) = fixed("first", json!(1));
        let (second, _) = fixed("second", json!(2));
        resolver.register(first);
        resolver.register(second);

        assert_eq!(resolver.get_protocol_handler("MEM").unwrap().name(), "second");
        let mut ctx = ProcessingContext::new();
        let resolved = resolver.resolve(&Reference::new("mem", "x"), &mut ctx).await.unwrap();
        assert_eq!(resolved.value, json!(2));
    }

    #[tokio::test]
    async fn test_cache_deduplicates_per_context() {
        let mut resolver = ReferenceResolver::new();
        let (handler, calls) = fixed("mem", json!("v"));
        resolver.register(handler);

        let reference = Reference::new("mem", "x");
        let mut ctx = ProcessingContext::new();
        assert!(!resolver.resolve(&reference, &mut ctx).await.unwrap().cached);
        assert!(resolver.resolve(&reference, &mut ctx).await.unwrap().cached);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A fresh context does not see the previous document's cache
        let mut other = ProcessingContext::new();
        assert!(!resolver.resolve(&reference, &mut other).await.unwrap().cached);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_protocol() {
        let resolver = ReferenceResolver::with_local_defaults();
        let mut ctx = ProcessingContext::new();
        let err = resolver
            .resolve(&Reference::new("ftp", "x"), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidReference { uri } if uri == "ftp:x"));
    }

    #[tokio::test]
    async fn test_handler_failure_is_wrapped() {
        let resolver = ReferenceResolver::with_local_defaults();
        let mut ctx = ProcessingContext::new();
        ctx.register_id("a", &Element::new("role").with_attribute("id", "a"));

        assert!(resolver.resolve(&Reference::new("id", "a"), &mut ctx).await.is_ok());
        match resolver.resolve(&Reference::new("id", "b"), &mut ctx).await {
            Err(ProcessError::ReferenceNotFound { uri, source }) => {
                assert_eq!(uri, "id:b");
                assert!(matches!(*source, ProcessError::UnknownId(_)));
            }
            other => panic!("expected ReferenceNotFound, got {other:?}"),
        }
    }
}
