//! Processors for rule-like tags: constraints, output formats and template
//! variables.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::ast::{Attributes, Element};
use crate::context::ProcessingContext;
use crate::error::{ProcessingError, Result};
use crate::registry::handler::{pick_attributes, trimmed_text, TagProcessor};

/// Context variable listing the template variables a document declares.
pub const DECLARED_VARIABLES: &str = "declaredVariables";

const CONSTRAINT_LEVELS: [&str; 3] = ["must", "should", "may"];

/// Handler for `<constraint>` elements.
pub struct ConstraintProcessor;

#[async_trait]
impl TagProcessor for ConstraintProcessor {
    fn tag_name(&self) -> &str {
        "constraint"
    }

    fn extract_attributes(
        &self,
        attributes: &Attributes,
        element: &Element,
        _context: &ProcessingContext,
    ) -> Result<Map<String, Value>> {
        let mut fields = Map::new();
        let level = attributes
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or("must");
        fields.insert("level".to_string(), Value::String(level.to_ascii_lowercase()));
        if let Some(text) = trimmed_text(element) {
            fields.insert("rule".to_string(), Value::String(text));
        }
        Ok(fields)
    }

    fn validate(&self, _element: &Element, semantic: &Map<String, Value>) -> Vec<ProcessingError> {
        let mut issues = Vec::new();
        if let Some(level) = semantic.get("level").and_then(Value::as_str) {
            if !CONSTRAINT_LEVELS.contains(&level) {
                issues.push(
                    ProcessingError::error(format!("Unknown constraint level '{level}'"))
                        .with_code("INVALID_CONSTRAINT_LEVEL"),
                );
            }
        }
        if !semantic.contains_key("rule") {
            issues.push(
                ProcessingError::warning("Constraint has no rule text").with_code("EMPTY_CONSTRAINT"),
            );
        }
        issues
    }
}

/// Handler for `<output-format>` elements.
///
/// For `format="json"` a JSON body is parsed into `schema`.
pub struct OutputFormatProcessor;

#[async_trait]
impl TagProcessor for OutputFormatProcessor {
    fn tag_name(&self) -> &str {
        "output-format"
    }

    fn extract_attributes(
        &self,
        attributes: &Attributes,
        element: &Element,
        _context: &ProcessingContext,
    ) -> Result<Map<String, Value>> {
        let mut fields = pick_attributes(attributes, &["format"]);
        if let Some(text) = trimmed_text(element) {
            let is_json = fields.get("format").and_then(Value::as_str) == Some("json");
            match serde_json::from_str::<Value>(&text) {
                Ok(schema) if is_json => {
                    fields.insert("schema".to_string(), schema);
                }
                _ => {
                    fields.insert("description".to_string(), Value::String(text));
                }
            }
        }
        Ok(fields)
    }

    fn validate(&self, element: &Element, semantic: &Map<String, Value>) -> Vec<ProcessingError> {
        let is_json = semantic.get("format").and_then(Value::as_str) == Some("json");
        let text = element.text();
        let body = text.trim();
        if is_json && body.starts_with('{') && !semantic.contains_key("schema") {
            vec![ProcessingError::warning("JSON output schema does not parse")
                .with_code("INVALID_OUTPUT_SCHEMA")]
        } else {
            Vec::new()
        }
    }
}

/// Handler for `<var>` elements.
///
/// Records the variable in the document's declared variable list.
pub struct VarProcessor;

#[async_trait]
impl TagProcessor for VarProcessor {
    fn tag_name(&self) -> &str {
        "var"
    }

    fn extract_attributes(
        &self,
        attributes: &Attributes,
        _element: &Element,
        _context: &ProcessingContext,
    ) -> Result<Map<String, Value>> {
        Ok(pick_attributes(attributes, &["name", "default"]))
    }

    fn validate(&self, _element: &Element, semantic: &Map<String, Value>) -> Vec<ProcessingError> {
        match semantic.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => Vec::new(),
            _ => vec![ProcessingError::error("Variable has no name").with_code("VAR_WITHOUT_NAME")],
        }
    }

    async fn post_process(&self, element: &mut Element, context: &mut ProcessingContext) -> Result<()> {
        let Some(name) = element.attribute_str("name") else {
            return Ok(());
        };
        let entry = context
            .variables
            .entry(DECLARED_VARIABLES.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(names) = entry {
            if !names.iter().any(|n| n.as_str() == Some(name)) {
                names.push(Value::String(name.to_string()));
            }
        }
        Ok(())
    }
}
