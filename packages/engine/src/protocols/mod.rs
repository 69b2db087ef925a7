//! Protocol handlers for reference URIs.
//!
//! A handler resolves `protocol:path` references for one or more protocols.
//! Handlers are registered with the [`ReferenceResolver`](crate::resolver::ReferenceResolver),
//! which picks the most recently registered handler that accepts a protocol.

mod file;
mod http;
mod id;

use async_trait::async_trait;
use serde_json::Value;

use crate::ast::Reference;
use crate::context::ProcessingContext;
use crate::error::Result;

pub use file::FileProtocolHandler;
pub use http::HttpProtocolHandler;
pub use id::IdProtocolHandler;

/// Resolver for one family of reference protocols.
///
/// `handle` may suspend on I/O; the context is read-only here so handlers
/// stay independent of traversal state.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Whether this handler resolves the given (lowercase) protocol.
    fn can_handle(&self, protocol: &str) -> bool;

    /// Resolve the reference to a value.
    async fn handle(&self, reference: &Reference, context: &ProcessingContext) -> Result<Value>;
}
