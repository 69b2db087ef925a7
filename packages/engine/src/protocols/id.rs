use async_trait::async_trait;
use serde_json::Value;

use super::ProtocolHandler;
use crate::ast::Reference;
use crate::context::ProcessingContext;
use crate::error::{ProcessError, Result};

/// Resolves `id:` references against the context's id index.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdProtocolHandler;

#[async_trait]
impl ProtocolHandler for IdProtocolHandler {
    fn name(&self) -> &str {
        "id"
    }

    fn can_handle(&self, protocol: &str) -> bool {
        protocol == "id"
    }

    async fn handle(&self, reference: &Reference, context: &ProcessingContext) -> Result<Value> {
        let element = context
            .element_by_id(&reference.path)
            .ok_or_else(|| ProcessError::UnknownId(reference.path.clone()))?;
        Ok(serde_json::to_value(element)?)
    }
}
