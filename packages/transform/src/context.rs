//! Per-run transform state.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use promptdoc_engine::ProcessedDocument;
use serde_json::{Map, Value};

use crate::config::TransformMode;

/// Key/value store for one transform run.
///
/// Variable lookups see the caller's variables first and fall back to the
/// variables captured during processing. Visitors can also keep typed state
/// keyed by type.
#[derive(Default)]
pub struct TransformContext {
    variables: Map<String, Value>,
    inherited: Map<String, Value>,
    document_metadata: Map<String, Value>,
    document_meta: Map<String, Value>,
    mode: TransformMode,
    parents: Vec<String>,
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl TransformContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context layered over a processing result.
    pub fn for_document(document: &ProcessedDocument, variables: Map<String, Value>) -> Self {
        let inherited = document
            .meta
            .get("variables")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Self {
            variables,
            inherited,
            document_metadata: document.metadata.clone(),
            document_meta: document.meta.clone(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: TransformMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables
            .get(name)
            .or_else(|| self.inherited.get(name))
    }

    /// Boolean variable, if set to a boolean (or `"true"`/`"false"`).
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.variable(name)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Document-level facts from processing (mode, lang, issues, ...).
    pub fn document_metadata(&self) -> &Map<String, Value> {
        &self.document_metadata
    }

    /// Transform-ready annotations from processing (e.g. `format`).
    pub fn document_meta(&self, key: &str) -> Option<&Value> {
        self.document_meta.get(key)
    }

    pub fn push_parent(&mut self, tag_name: &str) {
        self.parents.push(tag_name.to_string());
    }

    pub fn pop_parent(&mut self) -> Option<String> {
        self.parents.pop()
    }

    /// Tag name of the enclosing element.
    pub fn parent(&self) -> Option<&str> {
        self.parents.last().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.parents.len()
    }

    /// Store a typed value, replacing any previous value of that type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }
}

impl std::fmt::Debug for TransformContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformContext")
            .field("variables", &self.variables)
            .field("inherited", &self.inherited)
            .field("mode", &self.mode)
            .field("depth", &self.parents.len())
            .field("typed_values", &self.values.len())
            .finish()
    }
}
