use std::sync::Arc;

use async_trait::async_trait;
use promptdoc_engine::Element;
use serde_json::{json, Value};

use super::TransformVisitor;
use crate::context::TransformContext;
use crate::error::Result;
use crate::merge::{merge_objects, MergeOptions};
use crate::processors::{create_default_processors, TransformProcessorRegistry};

/// Runs transform-time tag processors.
///
/// Processors run highest priority first and each result is merged into
/// `element.meta`. With `ignore_errors` (the default) a failing processor
/// is logged and recorded in `meta.errors` while the remaining processors
/// still run; otherwise the failure is returned to the transformer.
#[derive(Debug, Clone)]
pub struct SemanticTagVisitor {
    registry: Arc<TransformProcessorRegistry>,
    ignore_errors: bool,
    merge: MergeOptions,
}

impl Default for SemanticTagVisitor {
    fn default() -> Self {
        Self::new(Arc::new(create_default_processors()))
    }
}

impl SemanticTagVisitor {
    pub fn new(registry: Arc<TransformProcessorRegistry>) -> Self {
        Self {
            registry,
            ignore_errors: true,
            merge: MergeOptions::default(),
        }
    }

    pub fn with_ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    pub fn with_merge_options(mut self, merge: MergeOptions) -> Self {
        self.merge = merge;
        self
    }
}

#[async_trait]
impl TransformVisitor for SemanticTagVisitor {
    fn name(&self) -> &str {
        "semantic-tag"
    }

    fn priority(&self) -> i32 {
        80
    }

    async fn visit_element(
        &self,
        element: &mut Element,
        context: &mut TransformContext,
    ) -> Result<()> {
        for processor in self.registry.processors_for(element) {
            match processor.process(element, context).await {
                Ok(partial) => {
                    element.meta = merge_objects(&element.meta, &partial, &self.merge);
                }
                Err(err) if self.ignore_errors => {
                    tracing::warn!(
                        processor = processor.name(),
                        tag = %element.tag_name,
                        error = %err,
                        "Transform processor failed"
                    );
                    let record = json!({
                        "processor": processor.name(),
                        "code": err.code(),
                        "message": err.to_string(),
                    });
                    match element.meta.get_mut("errors") {
                        Some(Value::Array(errors)) => errors.push(record),
                        _ => {
                            element
                                .meta
                                .insert("errors".to_string(), Value::Array(vec![record]));
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use crate::processors::TransformProcessor;
    use pretty_assertions::assert_eq;
    use serde_json::Map;

    struct Static {
        name: &'static str,
        priority: i32,
        result: Option<Value>,
    }

    #[async_trait]
    impl TransformProcessor for Static {
        fn name(&self) -> &str {
            self.name
        }

        fn tag_name(&self) -> &str {
            "task"
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn process(
            &self,
            _element: &Element,
            _context: &mut TransformContext,
        ) -> Result<Map<String, Value>> {
            match &self.result {
                Some(Value::Object(map)) => Ok(map.clone()),
                _ => Err(TransformError::Visitor {
                    visitor: self.name.to_string(),
                    message: "boom".to_string(),
                }),
            }
        }
    }

    fn without_errors(meta: &Map<String, Value>) -> Map<String, Value> {
        meta.iter()
            .filter(|(k, _)| k.as_str() != "errors")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn registry() -> Arc<TransformProcessorRegistry> {
        let mut registry = TransformProcessorRegistry::new();
        registry.register(Static {
            name: "low",
            priority: 1,
            result: Some(json!({"tone": "formal", "steps": 1})),
        });
        registry.register(Static {
            name: "failing",
            priority: 5,
            result: None,
        });
        registry.register(Static {
            name: "high",
            priority: 10,
            result: Some(json!({"tone": "casual", "audience": "dev"})),
        });
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_priority_merge_and_recorded_errors() {
        let visitor = SemanticTagVisitor::new(registry());
        let mut element = Element::new("task");
        visitor
            .visit_element(&mut element, &mut TransformContext::new())
            .await
            .unwrap();

        // "low" runs last, so its conflicting value wins
        assert_eq!(
            Value::Object(without_errors(&element.meta)),
            json!({"tone": "formal", "audience": "dev", "steps": 1})
        );
        assert_eq!(element.meta["errors"][0]["processor"], json!("failing"));
        assert_eq!(element.meta["errors"][0]["code"], json!("VISITOR_ERROR"));
    }

    #[tokio::test]
    async fn test_errors_propagate_when_not_ignored() {
        let visitor = SemanticTagVisitor::new(registry()).with_ignore_errors(false);
        let mut element = Element::new("task");
        let result = visitor
            .visit_element(&mut element, &mut TransformContext::new())
            .await;
        assert!(result.is_err());
        // Processors before the failure already contributed
        assert_eq!(element.meta["audience"], json!("dev"));
    }

    #[tokio::test]
    async fn test_default_registry_substitutes_vars() {
        let mut ctx = TransformContext::new();
        ctx.set_variable("user", json!("Ada"));
        let mut element = Element::new("var").with_attribute("name", "user");
        SemanticTagVisitor::default()
            .visit_element(&mut element, &mut ctx)
            .await
            .unwrap();
        assert_eq!(element.meta["value"], json!("Ada"));
    }
}
