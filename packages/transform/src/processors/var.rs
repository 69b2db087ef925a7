use async_trait::async_trait;
use promptdoc_engine::Element;
use serde_json::{Map, Value};

use super::TransformProcessor;
use crate::context::TransformContext;
use crate::error::{Result, TransformError};

/// Substitutes `<var name=".."/>` with a template variable.
///
/// The value comes from the transform context, then from the element's
/// `default` attribute. It is stored as `meta.value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VarProcessor;

#[async_trait]
impl TransformProcessor for VarProcessor {
    fn name(&self) -> &str {
        "var"
    }

    fn tag_name(&self) -> &str {
        "var"
    }

    async fn process(
        &self,
        element: &Element,
        context: &mut TransformContext,
    ) -> Result<Map<String, Value>> {
        let name = element
            .attribute_str("name")
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| TransformError::TagProcessor {
                processor: self.name().to_string(),
                tag: element.tag_name.clone(),
                message: "missing 'name' attribute".to_string(),
            })?;

        let value = match context.variable(name) {
            Some(value) => value.clone(),
            None => element
                .attributes
                .get("default")
                .cloned()
                .ok_or_else(|| TransformError::MissingVariable(name.to_string()))?,
        };

        tracing::trace!(variable = name, "Substituted template variable");
        let mut meta = Map::new();
        meta.insert("variable".to_string(), Value::String(name.to_string()));
        meta.insert("value".to_string(), value);
        Ok(meta)
    }
}
