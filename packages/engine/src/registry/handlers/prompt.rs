//! Processors for the prompt structure tags.
//!
//! These extract the descriptive parts of a prompt: the prompt itself, the
//! role the model plays, the task, background context and worked examples.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::ast::{Attributes, Element};
use crate::context::ProcessingContext;
use crate::error::{ProcessingError, Result};
use crate::registry::handler::{pick_attributes, trimmed_text, TagProcessor};

/// Handler for `<prompt>` elements.
///
/// Records the prompt's descriptive attributes and the tags of its direct
/// blocks, in order.
pub struct PromptProcessor;

#[async_trait]
impl TagProcessor for PromptProcessor {
    fn tag_name(&self) -> &str {
        "prompt"
    }

    fn extract_attributes(
        &self,
        attributes: &Attributes,
        element: &Element,
        _context: &ProcessingContext,
    ) -> Result<Map<String, Value>> {
        let mut fields = pick_attributes(attributes, &["name", "version", "description"]);
        let blocks: Vec<Value> = element
            .child_elements()
            .map(|child| Value::String(child.tag_name.clone()))
            .collect();
        fields.insert("blocks".to_string(), Value::Array(blocks));
        Ok(fields)
    }

    fn validate(&self, element: &Element, _semantic: &Map<String, Value>) -> Vec<ProcessingError> {
        if element.child_elements().any(|c| c.tag_name == "task") {
            Vec::new()
        } else {
            vec![ProcessingError::warning("Prompt has no <task>").with_code("PROMPT_WITHOUT_TASK")]
        }
    }
}

/// Handler for `<role>` elements.
pub struct RoleProcessor;

#[async_trait]
impl TagProcessor for RoleProcessor {
    fn tag_name(&self) -> &str {
        "role"
    }

    fn extract_attributes(
        &self,
        attributes: &Attributes,
        element: &Element,
        _context: &ProcessingContext,
    ) -> Result<Map<String, Value>> {
        let mut fields = pick_attributes(attributes, &["name", "expertise"]);
        if let Some(text) = trimmed_text(element) {
            fields.insert("description".to_string(), Value::String(text));
        }
        Ok(fields)
    }
}

/// Handler for `<task>` elements.
///
/// The `priority` attribute is stored as a number when it parses as one.
pub struct TaskProcessor;

#[async_trait]
impl TagProcessor for TaskProcessor {
    fn tag_name(&self) -> &str {
        "task"
    }

    fn extract_attributes(
        &self,
        attributes: &Attributes,
        element: &Element,
        _context: &ProcessingContext,
    ) -> Result<Map<String, Value>> {
        let mut fields = Map::new();
        if let Some(priority) = attributes.get("priority") {
            let parsed = priority
                .as_str()
                .and_then(|p| p.trim().parse::<i64>().ok())
                .map(Value::from)
                .unwrap_or_else(|| priority.clone());
            fields.insert("priority".to_string(), parsed);
        }
        if let Some(text) = trimmed_text(element) {
            fields.insert("instruction".to_string(), Value::String(text));
        }
        Ok(fields)
    }

    fn validate(&self, _element: &Element, semantic: &Map<String, Value>) -> Vec<ProcessingError> {
        if semantic.contains_key("instruction") {
            Vec::new()
        } else {
            vec![ProcessingError::warning("Task has no instruction text").with_code("EMPTY_TASK")]
        }
    }
}

/// Handler for `<context>` elements.
pub struct ContextProcessor;

#[async_trait]
impl TagProcessor for ContextProcessor {
    fn tag_name(&self) -> &str {
        "context"
    }

    fn extract_attributes(
        &self,
        attributes: &Attributes,
        element: &Element,
        _context: &ProcessingContext,
    ) -> Result<Map<String, Value>> {
        let mut fields = pick_attributes(attributes, &["source"]);
        if let Some(text) = trimmed_text(element) {
            fields.insert("text".to_string(), Value::String(text));
        }
        Ok(fields)
    }
}

/// Handler for `<example>` elements.
///
/// Input and output come from the attributes of the same name, or from
/// `<input>`/`<output>` child elements.
pub struct ExampleProcessor;

#[async_trait]
impl TagProcessor for ExampleProcessor {
    fn tag_name(&self) -> &str {
        "example"
    }

    fn extract_attributes(
        &self,
        attributes: &Attributes,
        element: &Element,
        _context: &ProcessingContext,
    ) -> Result<Map<String, Value>> {
        let mut fields = pick_attributes(attributes, &["title", "input", "output"]);
        for part in ["input", "output"] {
            if fields.contains_key(part) {
                continue;
            }
            if let Some(text) = element
                .child_elements()
                .find(|c| c.tag_name == part)
                .and_then(trimmed_text)
            {
                fields.insert(part.to_string(), Value::String(text));
            }
        }
        if !fields.contains_key("input") && !fields.contains_key("output") {
            if let Some(text) = trimmed_text(element) {
                fields.insert("content".to_string(), Value::String(text));
            }
        }
        Ok(fields)
    }
}
