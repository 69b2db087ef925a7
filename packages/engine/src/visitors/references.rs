use std::sync::Arc;

use async_trait::async_trait;

use super::NodeVisitor;
use crate::ast::{Deferred, Reference};
use crate::context::ProcessingContext;
use crate::error::Result;
use crate::resolver::ReferenceResolver;

/// Resolves reference nodes in place.
///
/// References whose protocol is listed as deferred are not fetched during
/// processing; they get a [`Deferred`] payload that the transform stage
/// awaits instead.
#[derive(Debug, Clone)]
pub struct ReferenceResolutionVisitor {
    resolver: Arc<ReferenceResolver>,
    deferred_protocols: Vec<String>,
}

impl ReferenceResolutionVisitor {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self {
            resolver,
            deferred_protocols: Vec::new(),
        }
    }

    pub fn with_deferred_protocols(mut self, protocols: &[String]) -> Self {
        self.deferred_protocols = protocols.iter().map(|p| p.to_ascii_lowercase()).collect();
        self
    }

    fn defer(&self, reference: &Reference, context: &ProcessingContext) -> Deferred {
        let resolver = self.resolver.clone();
        let target = Reference::new(reference.protocol.clone(), reference.path.clone());
        let file_path = context.file_path().map(|p| p.to_path_buf());
        Deferred::new(move || {
            let resolver = resolver.clone();
            let target = target.clone();
            let file_path = file_path.clone();
            async move {
                let mut context = ProcessingContext::new();
                if let Some(path) = file_path {
                    context = context.with_file_path(path);
                }
                Ok(resolver.resolve(&target, &mut context).await?.value)
            }
        })
    }
}

#[async_trait]
impl NodeVisitor for ReferenceResolutionVisitor {
    fn name(&self) -> &str {
        "reference-resolution"
    }

    fn priority(&self) -> i32 {
        80
    }

    async fn visit_reference(
        &self,
        reference: &mut Reference,
        context: &mut ProcessingContext,
    ) -> Result<()> {
        if reference.is_resolved() || reference.deferred.is_some() {
            return Ok(());
        }

        let protocol = reference.protocol.to_ascii_lowercase();
        if self.deferred_protocols.contains(&protocol) {
            tracing::debug!(uri = %reference.uri(), "Deferring reference resolution");
            reference.deferred = Some(self.defer(reference, context));
            return Ok(());
        }

        let resolved = self.resolver.resolve(reference, context).await?;
        reference.resolved = Some(resolved.value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Element;
    use crate::error::ProcessError;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolves_in_place() {
        let visitor = ReferenceResolutionVisitor::new(Arc::new(ReferenceResolver::with_local_defaults()));
        let mut ctx = ProcessingContext::new();
        ctx.register_id("r", &Element::new("role").with_attribute("id", "r"));

        let mut reference = Reference::new("id", "r");
        visitor.visit_reference(&mut reference, &mut ctx).await.unwrap();
        assert_eq!(reference.resolved.unwrap()["tagName"], json!("role"));
    }

    #[tokio::test]
    async fn test_deferred_protocol() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.json"), r#"{"title": "Later"}"#).unwrap();

        let visitor = ReferenceResolutionVisitor::new(Arc::new(ReferenceResolver::with_local_defaults()))
            .with_deferred_protocols(&["FILE".to_string()]);
        let mut ctx = ProcessingContext::new().with_file_path(dir.path().join("doc.xml"));

        let mut reference = Reference::new("file", "data.json");
        visitor.visit_reference(&mut reference, &mut ctx).await.unwrap();

        assert!(!reference.is_resolved());
        assert_eq!(ctx.cached_reference_count(), 0);
        let deferred = reference.deferred.unwrap();
        assert_eq!(deferred.resolve().await.unwrap(), json!({"title": "Later"}));
    }

    #[tokio::test]
    async fn test_unknown_protocol_fails() {
        let visitor = ReferenceResolutionVisitor::new(Arc::new(ReferenceResolver::with_local_defaults()));
        let mut reference = Reference::new("gopher", "x");
        let err = visitor
            .visit_reference(&mut reference, &mut ProcessingContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidReference { .. }));
    }
}
