use std::sync::Arc;

use async_trait::async_trait;

use super::NodeVisitor;
use crate::ast::Element;
use crate::context::ProcessingContext;
use crate::error::Result;
use crate::registry::{run_tag_processor, TagProcessorRegistry};

/// Dispatches elements to their processing-time tag processor.
///
/// Only the highest-priority processor that accepts the element runs.
#[derive(Debug, Clone)]
pub struct TagProcessorVisitor {
    registry: Arc<TagProcessorRegistry>,
}

impl TagProcessorVisitor {
    pub fn new(registry: Arc<TagProcessorRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl NodeVisitor for TagProcessorVisitor {
    fn name(&self) -> &str {
        "tag-processor"
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn visit_element(
        &self,
        element: &mut Element,
        context: &mut ProcessingContext,
    ) -> Result<()> {
        let Some(processor) = self.registry.find(element) else {
            return Ok(());
        };
        tracing::trace!(tag = %element.tag_name, "Running tag processor");
        run_tag_processor(processor.as_ref(), element, context).await
    }
}
