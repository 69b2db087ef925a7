//! Output adapters.
//!
//! An adapter renders a transformed document into one concrete format.
//! Adapters are registered in an [`AdapterFactory`] by format name and
//! picked per call by the [`AdapterSelector`].
//!
//! | format     | adapter             | output                  |
//! |------------|---------------------|-------------------------|
//! | `json`     | [`JsonAdapter`]     | `Structured` tree       |
//! | `xml`      | [`XmlAdapter`]      | `Text`                  |
//! | `markdown` | [`MarkdownAdapter`] | `Text`, front matter    |
//! | `generic`  | [`GenericAdapter`]  | `Structured` document   |

mod factory;
mod generic;
mod json;
mod markdown;
mod xml;

use std::fmt;

use promptdoc_engine::{Content, Element, Node, ProcessedDocument, Reference};
use serde_json::Value;

use crate::context::TransformContext;
use crate::error::Result;

pub use factory::{infer_format, AdapterFactory, AdapterSelector, OUTPUT_FORMAT_VARIABLE};
pub use generic::{GenericAdapter, GENERIC_FORMAT};
pub use json::JsonAdapter;
pub use markdown::MarkdownAdapter;
pub use xml::XmlAdapter;

/// Rendered document.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedOutput {
    Structured(Value),
    Text(String),
}

impl RenderedOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RenderedOutput::Text(text) => Some(text),
            RenderedOutput::Structured(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            RenderedOutput::Structured(value) => Some(value),
            RenderedOutput::Text(_) => None,
        }
    }
}

impl fmt::Display for RenderedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderedOutput::Structured(value) => {
                let text = serde_json::to_string_pretty(value).map_err(|_| fmt::Error)?;
                f.write_str(&text)
            }
            RenderedOutput::Text(text) => f.write_str(text),
        }
    }
}

/// Renders a transformed document into one format.
pub trait OutputAdapter: Send + Sync {
    /// Format name the adapter is registered under.
    fn format(&self) -> &str;

    fn description(&self) -> &str;

    fn render(&self, document: &ProcessedDocument, context: &TransformContext) -> Result<RenderedOutput>;
}

/// Value an element was substituted with during transformation (`<var>`).
pub(crate) fn substituted_value(element: &Element) -> Option<&Value> {
    element.meta.get("value")
}

/// Text of a content node, entity-decoded when decoding found any.
pub(crate) fn content_text(content: &Content) -> &str {
    content
        .meta
        .get("decodedValue")
        .and_then(Value::as_str)
        .unwrap_or(&content.value)
}

/// Rendered link target of a reference, or its URI.
pub(crate) fn reference_href(reference: &Reference) -> String {
    reference
        .meta
        .get("link")
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str)
        .map_or_else(|| reference.uri(), str::to_string)
}

pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Block children: elements that were not substituted by a value.
pub(crate) fn block_children(element: &Element) -> impl Iterator<Item = &Element> {
    element
        .child_elements()
        .filter(|e| substituted_value(e).is_none())
}

/// Inline text of the nodes, whitespace collapsed. Substituted elements
/// contribute their value and references their href; block elements
/// contribute their own inline text when `descend` is set.
pub(crate) fn inline_text(nodes: &[Node], descend: bool) -> String {
    let mut out = String::new();
    collect_inline(nodes, descend, &mut out);
    collapse_whitespace(&out)
}

fn collect_inline(nodes: &[Node], descend: bool, out: &mut String) {
    for node in nodes {
        match node {
            Node::Content(content) => out.push_str(content_text(content)),
            Node::Reference(reference) => out.push_str(&reference_href(reference)),
            Node::Element(element) => match substituted_value(element) {
                Some(value) => out.push_str(&value_text(value)),
                None if descend => collect_inline(&element.children, descend, out),
                None => out.push(' '),
            },
        }
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
