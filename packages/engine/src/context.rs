//! Per-document processing state
//!
//! One [`ProcessingContext`] exists per document run. It is never shared
//! across documents, so nothing in it needs locking.
//!
//! # Contents
//!
//! - **Id index**: element id to a snapshot of the element, first occurrence wins
//! - **Reference cache**: `protocol:path` to resolved value plus timestamp
//! - **Parent stack**: ancestors of the node currently being visited
//! - **Variables**: free-form values, including the document mode and
//!   user-supplied template variables
//! - **Inheritance chain**: `extends` targets currently being followed, for
//!   cycle detection (scoped push/pop)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ast::Element;
use crate::error::ProcessingError;

/// Document-level error policy declared by the root element's `mode`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DocumentMode {
    Strict,
    #[default]
    Loose,
}

/// Variable key under which the effective document mode is mirrored.
pub const DOCUMENT_MODE_VARIABLE: &str = "documentMode";

/// A cached reference resolution.
#[derive(Debug, Clone)]
pub struct CachedReference {
    pub value: Value,
    pub timestamp: DateTime<Utc>,
}

/// Lightweight record of an ancestor element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFrame {
    pub tag_name: String,
    pub id: Option<String>,
}

/// Mutable state for processing one document.
#[derive(Debug, Default)]
pub struct ProcessingContext {
    /// Source path of the document, used to resolve relative `file:` references.
    file_path: Option<PathBuf>,
    id_map: HashMap<String, Element>,
    resolved_references: HashMap<String, CachedReference>,
    parent_elements: Vec<ElementFrame>,
    /// Free-form variables.
    pub variables: Map<String, Value>,
    document_mode: DocumentMode,
    /// Whether the root element declared a mode explicitly.
    mode_declared: bool,
    /// Document-level facts gathered from the root element.
    document_metadata: Map<String, Value>,
    inheritance_chain: Vec<String>,
    issues: Vec<ProcessingError>,
}

impl ProcessingContext {
    pub fn new() -> Self {
        let mut ctx = Self::default();
        ctx.variables.insert(
            DOCUMENT_MODE_VARIABLE.to_string(),
            Value::String(DocumentMode::default().to_string()),
        );
        ctx
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    // -------------------------------------------------------------------------
    // Document mode
    // -------------------------------------------------------------------------

    pub fn document_mode(&self) -> DocumentMode {
        self.document_mode
    }

    /// Mode the document declared, if any. `None` means the handler's own
    /// policy applies.
    pub fn declared_mode(&self) -> Option<DocumentMode> {
        self.mode_declared.then_some(self.document_mode)
    }

    pub fn set_document_mode(&mut self, mode: DocumentMode, declared: bool) {
        self.document_mode = mode;
        self.mode_declared = declared;
        self.variables.insert(
            DOCUMENT_MODE_VARIABLE.to_string(),
            Value::String(mode.to_string()),
        );
    }

    pub fn document_metadata(&self) -> &Map<String, Value> {
        &self.document_metadata
    }

    pub fn set_document_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.document_metadata.insert(key.into(), value);
    }

    // -------------------------------------------------------------------------
    // Id index
    // -------------------------------------------------------------------------

    /// Index an element by id. Returns `false` if the id was already taken;
    /// the first registration is kept.
    pub fn register_id(&mut self, id: &str, element: &Element) -> bool {
        if self.id_map.contains_key(id) {
            return false;
        }
        self.id_map.insert(id.to_string(), element.clone());
        true
    }

    pub fn element_by_id(&self, id: &str) -> Option<&Element> {
        self.id_map.get(id)
    }

    pub fn indexed_ids(&self) -> impl Iterator<Item = &str> {
        self.id_map.keys().map(String::as_str)
    }

    // -------------------------------------------------------------------------
    // Reference cache
    // -------------------------------------------------------------------------

    pub fn cached_reference(&self, key: &str) -> Option<&CachedReference> {
        self.resolved_references.get(key)
    }

    pub fn cache_reference(&mut self, key: impl Into<String>, value: Value) {
        self.resolved_references.insert(
            key.into(),
            CachedReference {
                value,
                timestamp: Utc::now(),
            },
        );
    }

    pub fn cached_reference_count(&self) -> usize {
        self.resolved_references.len()
    }

    // -------------------------------------------------------------------------
    // Parent stack
    // -------------------------------------------------------------------------

    pub fn push_parent(&mut self, element: &Element) {
        self.parent_elements.push(ElementFrame {
            tag_name: element.tag_name.clone(),
            id: element.id().map(str::to_string),
        });
    }

    pub fn pop_parent(&mut self) -> Option<ElementFrame> {
        self.parent_elements.pop()
    }

    pub fn parent(&self) -> Option<&ElementFrame> {
        self.parent_elements.last()
    }

    pub fn depth(&self) -> usize {
        self.parent_elements.len()
    }

    // -------------------------------------------------------------------------
    // Inheritance chain
    // -------------------------------------------------------------------------

    /// Enter an `extends` resolution scope.
    pub fn enter_inheritance(&mut self, uri: impl Into<String>) {
        self.inheritance_chain.push(uri.into());
    }

    /// Leave the innermost `extends` resolution scope.
    pub fn leave_inheritance(&mut self, uri: &str) {
        if let Some(pos) = self.inheritance_chain.iter().rposition(|u| u == uri) {
            self.inheritance_chain.remove(pos);
        }
    }

    pub fn is_inheriting_from(&self, uri: &str) -> bool {
        self.inheritance_chain.iter().any(|u| u == uri)
    }

    pub fn inheritance_chain(&self) -> &[String] {
        &self.inheritance_chain
    }

    // -------------------------------------------------------------------------
    // Recovered issues
    // -------------------------------------------------------------------------

    pub fn record_issue(&mut self, issue: ProcessingError) {
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[ProcessingError] {
        &self.issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mode_defaults_to_loose_undeclared() {
        let ctx = ProcessingContext::new();
        assert_eq!(ctx.document_mode(), DocumentMode::Loose);
        assert_eq!(ctx.declared_mode(), None);
        assert_eq!(ctx.variables[DOCUMENT_MODE_VARIABLE], json!("loose"));
    }

    #[test]
    fn test_set_mode_mirrors_variable() {
        let mut ctx = ProcessingContext::new();
        ctx.set_document_mode("STRICT".parse().unwrap(), true);
        assert_eq!(ctx.declared_mode(), Some(DocumentMode::Strict));
        assert_eq!(ctx.variables[DOCUMENT_MODE_VARIABLE], json!("strict"));
    }

    #[test]
    fn test_first_id_wins() {
        let mut ctx = ProcessingContext::new();
        let first = Element::new("role").with_attribute("id", "a");
        let second = Element::new("task").with_attribute("id", "a");

        assert!(ctx.register_id("a", &first));
        assert!(!ctx.register_id("a", &second));
        assert_eq!(ctx.element_by_id("a").unwrap().tag_name, "role");
    }

    #[test]
    fn test_inheritance_chain_scoping() {
        let mut ctx = ProcessingContext::new();
        ctx.enter_inheritance("id:a");
        ctx.enter_inheritance("id:b");
        assert!(ctx.is_inheriting_from("id:a"));

        ctx.leave_inheritance("id:b");
        assert!(!ctx.is_inheriting_from("id:b"));
        assert_eq!(ctx.inheritance_chain(), ["id:a".to_string()]);
    }

    #[test]
    fn test_reference_cache() {
        let mut ctx = ProcessingContext::new();
        assert!(ctx.cached_reference("id:a").is_none());
        ctx.cache_reference("id:a", json!("value"));
        assert_eq!(ctx.cached_reference("id:a").unwrap().value, json!("value"));
        assert_eq!(ctx.cached_reference_count(), 1);
    }
}
