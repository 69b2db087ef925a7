//! Document tree produced by the tokenizer and annotated by the pipeline.
//!
//! Nodes are created once and progressively annotated in place: the
//! processing stage writes into [`Element::metadata`], the transform stage
//! into the various `meta` maps. The two maps are kept apart so neither
//! stage can clobber the other's annotations.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Boxed, sendable future used at the async seams of the pipeline.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Attribute map of an element. Values are usually strings; object values
/// take part in shallow merging during inheritance.
pub type Attributes = BTreeMap<String, Value>;

/// Free-form annotation map.
pub type Annotations = Map<String, Value>;

/// A point in the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

/// Source span of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub start: Location,
    pub end: Location,
}

/// Kind tag shared by every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    Document,
    Element,
    Content,
    Reference,
}

/// Root of a parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub position: Position,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            children,
            position: Position::default(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::Document
    }

    /// First element child, which carries document-level attributes.
    pub fn root_element(&self) -> Option<&Element> {
        self.children.iter().find_map(Node::as_element)
    }

    pub fn root_element_mut(&mut self) -> Option<&mut Element> {
        self.children.iter_mut().find_map(Node::as_element_mut)
    }

    /// Depth-first search for the first element with the given id.
    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        self.children.iter().find_map(|node| match node {
            Node::Element(element) => element.find_by_id(id),
            _ => None,
        })
    }

    /// All elements in document order.
    pub fn elements(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        for node in &self.children {
            if let Node::Element(element) = node {
                element.collect_elements(&mut out);
            }
        }
        out
    }
}

/// A child node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Element(Element),
    Content(Content),
    Reference(Reference),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Element(_) => NodeKind::Element,
            Node::Content(_) => NodeKind::Content,
            Node::Reference(_) => NodeKind::Reference,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Node::Element(e) => e.position,
            Node::Content(c) => c.position,
            Node::Reference(r) => r.position,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl From<Content> for Node {
    fn from(content: Content) -> Self {
        Node::Content(content)
    }
}

impl From<Reference> for Node {
    fn from(reference: Reference) -> Self {
        Node::Reference(reference)
    }
}

/// A tagged element with attributes and children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub tag_name: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub children: Vec<Node>,
    /// Processing-stage semantic annotations.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Annotations,
    /// Transform-stage annotations.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Annotations,
    #[serde(default)]
    pub position: Position,
}

impl Element {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            ..Self::default()
        }
    }

    /// Builder: set a string attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(name.into(), Value::String(value.into()));
        self
    }

    /// Builder: set an attribute to an arbitrary JSON value.
    pub fn with_attribute_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Content::new(text))
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Attribute value as a string slice, if it is a string.
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute_str("id")
    }

    /// Child elements, skipping content and references.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn has_element_children(&self) -> bool {
        self.child_elements().next().is_some()
    }

    /// Concatenated text of all descendant content nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Content(content) => out.push_str(&content.value),
                Node::Element(element) => element.collect_text(out),
                Node::Reference(_) => {}
            }
        }
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        if self.id() == Some(id) {
            return Some(self);
        }
        self.child_elements().find_map(|child| child.find_by_id(id))
    }

    fn collect_elements<'a>(&'a self, out: &mut Vec<&'a Element>) {
        out.push(self);
        for child in self.child_elements() {
            child.collect_elements(out);
        }
    }
}

/// A run of raw text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    pub value: String,
    /// Format annotations added during transformation.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Annotations,
    #[serde(default)]
    pub position: Position,
}

impl Content {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

/// Thunk producing a value whose resolution was deferred to a later,
/// suspending step.
#[derive(Clone)]
pub struct Deferred(Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>);

impl Deferred {
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self(Arc::new(move || -> BoxFuture<'static, Result<Value>> {
            Box::pin(producer())
        }))
    }

    /// Deferred payload that is already known.
    pub fn ready(value: Value) -> Self {
        Self::new(move || {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    pub async fn resolve(&self) -> Result<Value> {
        (self.0)().await
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// A pointer to content located elsewhere, resolved during processing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reference {
    pub protocol: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Value>,
    /// Pending payload awaited by the transform stage.
    #[serde(skip)]
    pub deferred: Option<Deferred>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Annotations,
    #[serde(default)]
    pub position: Position,
}

impl Reference {
    pub fn new(protocol: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_resolved(mut self, value: Value) -> Self {
        self.resolved = Some(value);
        self
    }

    pub fn with_deferred(mut self, deferred: Deferred) -> Self {
        self.deferred = Some(deferred);
        self
    }

    /// Cache key and display form: `protocol:path`.
    pub fn uri(&self) -> String {
        format!("{}:{}", self.protocol, self.path)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

/// A processed document: the annotated tree plus document-level results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub document: Document,
    /// Document-level facts: mode, lang, schema, version, collected issues.
    #[serde(default)]
    pub metadata: Annotations,
    /// Semantic extraction results keyed by element id.
    #[serde(default)]
    pub semantics: Annotations,
    /// Transform-ready annotations.
    #[serde(default)]
    pub meta: Annotations,
}

impl ProcessedDocument {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    fn issue_list(&self, key: &str) -> &[Value] {
        self.metadata
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn validation_errors(&self) -> &[Value] {
        self.issue_list("validationErrors")
    }

    pub fn validation_warnings(&self) -> &[Value] {
        self.issue_list("validationWarnings")
    }

    pub fn processing_errors(&self) -> &[Value] {
        self.issue_list("processingErrors")
    }

    /// True when the run finished but recovered from at least one issue.
    pub fn has_warnings(&self) -> bool {
        !self.validation_warnings().is_empty() || !self.processing_errors().is_empty()
    }
}
