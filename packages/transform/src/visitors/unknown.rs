//! Handling of elements outside the known vocabulary.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use promptdoc_engine::{Element, TagRegistry};
use serde_json::Value;

use super::TransformVisitor;
use crate::context::TransformContext;
use crate::error::Result;

/// Tag an unknown element is renamed to when replacement is enabled.
pub const DEFAULT_REPLACEMENT_TAG: &str = "section";

/// Returns `true` for elements that should be treated as unknown.
pub type TagPredicate = Arc<dyn Fn(&Element) -> bool + Send + Sync>;

/// Picks a replacement tag name; `None` falls back to the configured default.
pub type TagReplacer = Arc<dyn Fn(&Element) -> Option<String> + Send + Sync>;

/// Marks, warns about and optionally renames unknown elements.
///
/// An element is unknown when its tag is not in `known_tags`, unless a
/// custom predicate is set, which then decides alone.
#[derive(Clone)]
pub struct UnknownElementVisitor {
    known_tags: HashSet<String>,
    predicate: Option<TagPredicate>,
    mark: bool,
    warn: bool,
    replace: bool,
    replacement: String,
    replacer: Option<TagReplacer>,
}

impl UnknownElementVisitor {
    pub fn new<I, S>(known_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_tags: known_tags.into_iter().map(Into::into).collect(),
            predicate: None,
            mark: true,
            warn: true,
            replace: false,
            replacement: DEFAULT_REPLACEMENT_TAG.to_string(),
            replacer: None,
        }
    }

    /// Known tags taken from a schema.
    pub fn for_schema(schema: &TagRegistry) -> Self {
        Self::new(schema.tag_names())
    }

    pub fn with_predicate(mut self, predicate: impl Fn(&Element) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn with_marking(mut self, mark: bool) -> Self {
        self.mark = mark;
        self
    }

    pub fn with_warnings(mut self, warn: bool) -> Self {
        self.warn = warn;
        self
    }

    /// Enable renaming unknown elements to `replacement`.
    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replace = true;
        self.replacement = replacement.into();
        self
    }

    pub fn with_replacer(
        mut self,
        replacer: impl Fn(&Element) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.replace = true;
        self.replacer = Some(Arc::new(replacer));
        self
    }

    pub fn is_unknown(&self, element: &Element) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(element),
            None => !self.known_tags.contains(&element.tag_name),
        }
    }
}

impl std::fmt::Debug for UnknownElementVisitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnknownElementVisitor")
            .field("known_tags", &self.known_tags.len())
            .field("predicate", &self.predicate.is_some())
            .field("mark", &self.mark)
            .field("warn", &self.warn)
            .field("replace", &self.replace)
            .field("replacement", &self.replacement)
            .finish()
    }
}

#[async_trait]
impl TransformVisitor for UnknownElementVisitor {
    fn name(&self) -> &str {
        "unknown-element"
    }

    fn priority(&self) -> i32 {
        100
    }

    async fn visit_element(
        &self,
        element: &mut Element,
        _context: &mut TransformContext,
    ) -> Result<()> {
        if !self.is_unknown(element) {
            return Ok(());
        }
        let original = element.tag_name.clone();

        if self.mark {
            element.meta.insert("isUnknown".to_string(), Value::Bool(true));
        }
        if self.mark || self.replace {
            element
                .meta
                .insert("originalTag".to_string(), Value::String(original.clone()));
        }
        if self.warn {
            tracing::warn!(tag = %original, "Unknown element");
            element.meta.insert(
                "warning".to_string(),
                Value::String(format!("Unknown element <{original}>")),
            );
        }
        if self.replace {
            let replacement = self
                .replacer
                .as_ref()
                .and_then(|replacer| replacer(element))
                .unwrap_or_else(|| self.replacement.clone());
            tracing::debug!(from = %original, to = %replacement, "Replaced unknown element");
            element.tag_name = replacement;
        }
        Ok(())
    }
}
