use std::collections::HashMap;
use std::sync::Arc;

use promptdoc_engine::{Node, ProcessedDocument};
use serde_json::Value;

use super::{
    GenericAdapter, JsonAdapter, MarkdownAdapter, OutputAdapter, RenderedOutput, XmlAdapter,
    GENERIC_FORMAT,
};
use crate::context::TransformContext;
use crate::error::{Result, TransformError};

/// Context variable naming the output format for one call.
pub const OUTPUT_FORMAT_VARIABLE: &str = "outputFormat";

/// Registry of output adapters keyed by format name.
///
/// Lookups are case-insensitive and go through a small alias table
/// (`md` resolves to `markdown`).
pub struct AdapterFactory {
    adapters: HashMap<String, Arc<dyn OutputAdapter>>,
    aliases: HashMap<String, String>,
}

impl AdapterFactory {
    /// Empty factory without adapters.
    pub fn new() -> Self {
        let mut aliases = HashMap::new();
        aliases.insert("md".to_string(), "markdown".to_string());
        Self {
            adapters: HashMap::new(),
            aliases,
        }
    }

    /// Factory with the built-in json, xml, markdown and generic adapters.
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        factory.register(JsonAdapter::new());
        factory.register(XmlAdapter::new());
        factory.register(MarkdownAdapter::new());
        factory.register(GenericAdapter);
        factory
    }

    /// Register an adapter under its format name, replacing any previous one.
    pub fn register<A: OutputAdapter + 'static>(&mut self, adapter: A) {
        self.register_arc(Arc::new(adapter));
    }

    pub fn register_arc(&mut self, adapter: Arc<dyn OutputAdapter>) {
        let format = adapter.format().to_ascii_lowercase();
        tracing::debug!(format = %format, "Registered output adapter");
        self.adapters.insert(format, adapter);
    }

    pub fn register_alias(&mut self, alias: impl Into<String>, format: impl Into<String>) {
        self.aliases.insert(
            alias.into().to_ascii_lowercase(),
            format.into().to_ascii_lowercase(),
        );
    }

    pub fn get(&self, format: &str) -> Option<Arc<dyn OutputAdapter>> {
        let key = format.trim().to_ascii_lowercase();
        let key = self.aliases.get(&key).cloned().unwrap_or(key);
        self.adapters.get(&key).cloned()
    }

    pub fn has(&self, format: &str) -> bool {
        self.get(format).is_some()
    }

    /// Registered format names, sorted.
    pub fn list_formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }

    /// Render with the adapter registered for `format`.
    pub fn render(
        &self,
        document: &ProcessedDocument,
        format: &str,
        context: &TransformContext,
    ) -> Result<RenderedOutput> {
        let adapter = self
            .get(format)
            .ok_or_else(|| TransformError::AdapterNotFound(format.to_string()))?;
        adapter.render(document, context)
    }
}

impl Default for AdapterFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("formats", &self.list_formats())
            .finish()
    }
}

/// Picks the adapter for one transform call.
///
/// Candidates are tried in order: the requested format, the
/// `outputFormat` context variable, the document's declared format, the
/// configured default format, and finally a format inferred from the
/// content. The first candidate with a
/// registered adapter wins. When none matches, the generic adapter is
/// used unless strict matching is on.
#[derive(Debug, Clone)]
pub struct AdapterSelector {
    factory: Arc<AdapterFactory>,
    default_format: Option<String>,
    infer: bool,
    strict_matching: bool,
}

impl AdapterSelector {
    pub fn new(factory: Arc<AdapterFactory>) -> Self {
        Self {
            factory,
            default_format: None,
            infer: true,
            strict_matching: false,
        }
    }

    pub fn with_default_format(mut self, format: Option<String>) -> Self {
        self.default_format = format;
        self
    }

    pub fn with_inference(mut self, infer: bool) -> Self {
        self.infer = infer;
        self
    }

    pub fn with_strict_matching(mut self, strict: bool) -> Self {
        self.strict_matching = strict;
        self
    }

    pub fn factory(&self) -> &AdapterFactory {
        &self.factory
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        document: &ProcessedDocument,
        context: &TransformContext,
    ) -> Option<Arc<dyn OutputAdapter>> {
        let candidates = [
            ("requested", requested.map(str::to_string)),
            (
                "context",
                context
                    .variable(OUTPUT_FORMAT_VARIABLE)
                    .and_then(Value::as_str)
                    .map(str::to_string),
            ),
            (
                "document",
                document
                    .meta
                    .get("format")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            ),
            ("default", self.default_format.clone()),
            (
                "inferred",
                self.infer
                    .then(|| infer_format(document))
                    .flatten()
                    .map(str::to_string),
            ),
        ];

        for (source, format) in candidates {
            let Some(format) = format else { continue };
            match self.factory.get(&format) {
                Some(adapter) => {
                    tracing::debug!(source, format = %format, "Selected output adapter");
                    return Some(adapter);
                }
                None => tracing::debug!(source, format = %format, "No adapter for format"),
            }
        }

        if self.strict_matching {
            tracing::debug!("No output adapter matched");
            return None;
        }
        tracing::debug!("Falling back to generic adapter");
        self.factory.get(GENERIC_FORMAT)
    }
}

impl Default for AdapterSelector {
    fn default() -> Self {
        Self::new(Arc::new(AdapterFactory::with_defaults()))
    }
}

/// Guess an output format from what the document contains.
///
/// Content nodes are sniffed in document order, then the extracted
/// semantics are inspected recursively.
pub fn infer_format(document: &ProcessedDocument) -> Option<&'static str> {
    sniff_nodes(&document.document.children)
        .or_else(|| sniff_value(&Value::Object(document.semantics.clone())))
}

fn sniff_nodes(nodes: &[Node]) -> Option<&'static str> {
    nodes.iter().find_map(|node| match node {
        Node::Content(content) => sniff_text(&content.value),
        Node::Element(element) => sniff_nodes(&element.children),
        Node::Reference(_) => None,
    })
}

fn sniff_value(value: &Value) -> Option<&'static str> {
    match value {
        Value::String(text) => sniff_text(text),
        Value::Array(items) => items.iter().find_map(sniff_value),
        Value::Object(map) => map.values().find_map(sniff_value),
        _ => None,
    }
}

fn sniff_text(text: &str) -> Option<&'static str> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let bracketed = (text.starts_with('{') && text.ends_with('}'))
        || (text.starts_with('[') && text.ends_with(']'));
    if bracketed && serde_json::from_str::<Value>(text).is_ok() {
        return Some("json");
    }
    if text.starts_with('<') && text.ends_with('>') {
        return Some("xml");
    }
    let markdown = text.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("# ")
            || line.starts_with("## ")
            || line.starts_with("```")
            || line.starts_with("- ")
    });
    markdown.then_some("markdown")
}
