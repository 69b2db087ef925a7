//! Transform-time tag processors.
//!
//! Independent of the processing-stage tag processors: these run after
//! processing, see the transform context, and contribute annotations to
//! `element.meta`. Several processors may accept one element; their
//! partial results are merged in priority order.

mod code;
mod var;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use promptdoc_engine::Element;
use serde_json::{Map, Value};

use crate::context::TransformContext;
use crate::error::Result;

pub(crate) use code::code_body;
pub use code::{CodeProcessor, DEFAULT_CODE_LANGUAGE};
pub use var::VarProcessor;

#[async_trait]
pub trait TransformProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn tag_name(&self) -> &str;

    /// Higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    fn can_process(&self, element: &Element) -> bool {
        element.tag_name == self.tag_name()
    }

    /// Annotations to merge into `element.meta`.
    async fn process(
        &self,
        element: &Element,
        context: &mut TransformContext,
    ) -> Result<Map<String, Value>>;
}

/// Transform processors keyed by tag name, highest priority first.
#[derive(Clone, Default)]
pub struct TransformProcessorRegistry {
    processors: HashMap<String, Vec<Arc<dyn TransformProcessor>>>,
}

impl TransformProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: impl TransformProcessor + 'static) {
        self.register_arc(Arc::new(processor));
    }

    pub fn register_arc(&mut self, processor: Arc<dyn TransformProcessor>) {
        let entry = self
            .processors
            .entry(processor.tag_name().to_string())
            .or_default();
        entry.push(processor);
        entry.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Processors accepting the element, in execution order.
    pub fn processors_for(&self, element: &Element) -> Vec<Arc<dyn TransformProcessor>> {
        self.processors
            .get(&element.tag_name)
            .map(|list| {
                list.iter()
                    .filter(|p| p.can_process(element))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_processor(&self, tag_name: &str) -> bool {
        self.processors.contains_key(tag_name)
    }

    pub fn registered_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl std::fmt::Debug for TransformProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformProcessorRegistry")
            .field("tags", &self.registered_tags())
            .finish()
    }
}

/// Registry with the built-in `var` and `code` processors.
pub fn create_default_processors() -> TransformProcessorRegistry {
    let mut registry = TransformProcessorRegistry::new();
    registry.register(VarProcessor);
    registry.register(CodeProcessor);
    registry
}
