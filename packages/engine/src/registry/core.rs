//! Tag processor registry keyed by tag name.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::handler::TagProcessor;
use crate::ast::Element;

/// Registry mapping tag names to processors.
///
/// Several processors may be registered for one tag; they are kept sorted
/// by descending priority, registration order breaking ties.
#[derive(Default, Clone)]
pub struct TagProcessorRegistry {
    processors: HashMap<String, Vec<Arc<dyn TagProcessor>>>,
}

impl TagProcessorRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor under its own tag name.
    pub fn register(&mut self, processor: impl TagProcessor + 'static) {
        self.register_arc(Arc::new(processor));
    }

    pub fn register_arc(&mut self, processor: Arc<dyn TagProcessor>) {
        let list = self
            .processors
            .entry(processor.tag_name().to_string())
            .or_default();
        list.push(processor);
        // Stable sort keeps registration order among equal priorities
        list.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Highest-priority processor that accepts the element.
    pub fn find(&self, element: &Element) -> Option<&Arc<dyn TagProcessor>> {
        self.processors
            .get(&element.tag_name)?
            .iter()
            .find(|p| p.can_process(element))
    }

    /// All processors for a tag, highest priority first.
    pub fn processors_for(&self, tag_name: &str) -> &[Arc<dyn TagProcessor>] {
        self.processors
            .get(tag_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Check if a processor is registered for a tag.
    #[must_use]
    pub fn has_processor(&self, tag_name: &str) -> bool {
        self.processors.contains_key(tag_name)
    }

    /// Return set of all registered tag names.
    #[must_use]
    pub fn registered_tags(&self) -> HashSet<&str> {
        self.processors.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for TagProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&str> = self.registered_tags().into_iter().collect();
        tags.sort_unstable();
        f.debug_struct("TagProcessorRegistry").field("tags", &tags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Attributes;
    use crate::context::ProcessingContext;
    use crate::error::Result;
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    struct Dummy {
        name: &'static str,
        priority: i32,
        only_with_id: bool,
    }

    #[async_trait]
    impl TagProcessor for Dummy {
        fn tag_name(&self) -> &str {
            "task"
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn can_process(&self, element: &Element) -> bool {
            element.tag_name == "task" && (!self.only_with_id || element.id().is_some())
        }

        fn extract_attributes(
            &self,
            _attributes: &Attributes,
            _element: &Element,
            _context: &ProcessingContext,
        ) -> Result<Map<String, Value>> {
            let mut map = Map::new();
            map.insert("by".into(), Value::String(self.name.into()));
            Ok(map)
        }
    }

    #[test]
    fn test_priority_order_and_can_process() {
        let mut registry = TagProcessorRegistry::new();
        registry.register(Dummy { name: "low", priority: 1, only_with_id: false });
        registry.register(Dummy { name: "high", priority: 10, only_with_id: true });

        assert_eq!(registry.processors_for("task")[0].priority(), 10);

        let with_id = Element::new("task").with_attribute("id", "t");
        assert_eq!(registry.find(&with_id).unwrap().priority(), 10);

        let without_id = Element::new("task");
        assert_eq!(registry.find(&without_id).unwrap().priority(), 1);

        assert!(registry.find(&Element::new("role")).is_none());
    }

    #[test]
    fn test_registry_has_processor() {
        let mut registry = TagProcessorRegistry::new();
        registry.register(Dummy { name: "x", priority: 0, only_with_id: false });

        assert!(registry.has_processor("task"));
        assert!(!registry.has_processor("missing"));
        assert!(registry.processors_for("missing").is_empty());
    }
}
