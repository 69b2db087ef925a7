use promptdoc_engine::{Element, Node, ProcessedDocument};
use serde_json::{Map, Value};

use super::{block_children, inline_text, substituted_value, OutputAdapter, RenderedOutput};
use crate::context::TransformContext;
use crate::error::Result;

const ATTRIBUTES_KEY: &str = "@attributes";
const TEXT_KEY: &str = "@text";
const META_KEY: &str = "@meta";
const REFERENCES_KEY: &str = "@references";

/// Mirrors the element tree as JSON.
///
/// Child elements become keys named after their tag; repeated sibling
/// tags collapse into an array in document order. An element with only
/// text becomes that string and a substituted `<var>` becomes its value.
/// Anything richer becomes an object with `@attributes`, `@text`, `@meta`
/// and `@references` entries next to its children. Tag names cannot start
/// with `@`, so a child never shadows one of these entries.
#[derive(Debug, Clone)]
pub struct JsonAdapter {
    include_meta: bool,
}

impl Default for JsonAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonAdapter {
    pub fn new() -> Self {
        Self { include_meta: true }
    }

    /// Whether transform annotations are emitted under `meta`.
    pub fn with_meta(mut self, include: bool) -> Self {
        self.include_meta = include;
        self
    }

    fn element_value(&self, element: &Element) -> Value {
        if let Some(value) = substituted_value(element) {
            return value.clone();
        }

        let text = inline_text(&element.children, false);
        let references: Vec<Value> = element
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Reference(reference) => Some(
                    reference
                        .meta
                        .get("link")
                        .cloned()
                        .unwrap_or_else(|| Value::String(reference.uri())),
                ),
                _ => None,
            })
            .collect();
        let children = self.collapse(block_children(element));
        let meta = self.include_meta && !element.meta.is_empty();

        if element.attributes.is_empty() && children.is_empty() && references.is_empty() && !meta {
            return Value::String(text);
        }

        let mut object = Map::new();
        if !element.attributes.is_empty() {
            let attributes: Map<String, Value> = element
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            object.insert(ATTRIBUTES_KEY.to_string(), Value::Object(attributes));
        }
        if !text.is_empty() {
            object.insert(TEXT_KEY.to_string(), Value::String(text));
        }
        if meta {
            object.insert(META_KEY.to_string(), Value::Object(element.meta.clone()));
        }
        if !references.is_empty() {
            object.insert(REFERENCES_KEY.to_string(), Value::Array(references));
        }
        object.extend(children);
        Value::Object(object)
    }

    fn collapse<'a>(&self, elements: impl Iterator<Item = &'a Element>) -> Map<String, Value> {
        let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
        for element in elements {
            let value = self.element_value(element);
            match groups.iter_mut().find(|(tag, _)| *tag == element.tag_name) {
                Some((_, values)) => values.push(value),
                None => groups.push((element.tag_name.clone(), vec![value])),
            }
        }

        groups
            .into_iter()
            .map(|(tag, mut values)| {
                let value = if values.len() == 1 {
                    values.remove(0)
                } else {
                    Value::Array(values)
                };
                (tag, value)
            })
            .collect()
    }
}

impl OutputAdapter for JsonAdapter {
    fn format(&self) -> &str {
        "json"
    }

    fn description(&self) -> &str {
        "Element tree mirrored as JSON"
    }

    fn render(&self, document: &ProcessedDocument, _context: &TransformContext) -> Result<RenderedOutput> {
        let roots = document.document.children.iter().filter_map(Node::as_element);
        Ok(RenderedOutput::Structured(Value::Object(self.collapse(roots))))
    }
}
