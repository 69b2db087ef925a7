//! Link rendering for reference nodes.
//!
//! | protocol       | link                                                   |
//! |----------------|--------------------------------------------------------|
//! | `id`           | `href: "#path"`, `isInternal`                          |
//! | `file`         | `href: path`, `isExternal`, `isFile`                   |
//! | `http`/`https` | `href: "proto://path"`, `isExternal`, `isRemote`, `isSecure` |
//! | other          | `href: "proto:path"`                                   |
//!
//! The link is stored as `reference.meta.link`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use promptdoc_engine::Reference;
use serde_json::{json, Map, Value};

use super::TransformVisitor;
use crate::context::TransformContext;
use crate::error::Result;
use crate::merge::{merge_objects, ConflictStrategy, MergeOptions};

/// Metadata key holding the rendered link.
pub const LINK_KEY: &str = "link";

/// Builds the link object for one protocol.
pub type LinkFormatter = Arc<dyn Fn(&Reference) -> Map<String, Value> + Send + Sync>;

/// Link for a reference without a resolved value.
pub fn unresolved_link(reference: &Reference) -> Map<String, Value> {
    object(json!({
        "type": "link",
        "href": format!("#{}", reference.path),
        "unresolved": true,
        "error": "Reference not resolved",
    }))
}

/// Default link for a resolved reference.
pub fn default_link(reference: &Reference) -> Map<String, Value> {
    let path = reference.path.as_str();
    let protocol = reference.protocol.to_ascii_lowercase();
    let link = match protocol.as_str() {
        "id" => json!({"type": "link", "href": format!("#{path}"), "isInternal": true}),
        "file" => json!({"type": "link", "href": path, "isExternal": true, "isFile": true}),
        protocol @ ("http" | "https") => json!({
            "type": "link",
            "href": format!("{protocol}://{}", path.trim_start_matches('/')),
            "isExternal": true,
            "isRemote": true,
            "isSecure": protocol == "https",
        }),
        _ => json!({"type": "link", "href": reference.uri()}),
    };
    object(link)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Turns references into link-shaped values.
///
/// Custom formatters take precedence over the defaults. Nested references
/// listed under `resolved.references` are rendered too and attached as
/// `references`. A deferred payload is awaited and its fields are merged
/// into the link without overriding the link's own fields.
#[derive(Clone, Default)]
pub struct ReferenceVisitor {
    formatters: HashMap<String, LinkFormatter>,
}

impl ReferenceVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_formatter(
        mut self,
        protocol: impl Into<String>,
        formatter: impl Fn(&Reference) -> Map<String, Value> + Send + Sync + 'static,
    ) -> Self {
        self.formatters
            .insert(protocol.into().to_ascii_lowercase(), Arc::new(formatter));
        self
    }

    /// Link for a reference, with nested references rendered.
    pub fn format(&self, reference: &Reference) -> Map<String, Value> {
        let Some(resolved) = &reference.resolved else {
            return unresolved_link(reference);
        };

        let mut link = match self.formatters.get(&reference.protocol.to_ascii_lowercase()) {
            Some(formatter) => formatter(reference),
            None => default_link(reference),
        };

        if let Some(nested) = resolved.get("references").and_then(Value::as_array) {
            let links: Vec<Value> = nested
                .iter()
                .filter_map(|value| serde_json::from_value::<Reference>(value.clone()).ok())
                .map(|nested| Value::Object(self.format(&nested)))
                .collect();
            link.insert("references".to_string(), Value::Array(links));
        }
        link
    }
}

impl std::fmt::Debug for ReferenceVisitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut protocols: Vec<&String> = self.formatters.keys().collect();
        protocols.sort();
        f.debug_struct("ReferenceVisitor")
            .field("formatters", &protocols)
            .finish()
    }
}

#[async_trait]
impl TransformVisitor for ReferenceVisitor {
    fn name(&self) -> &str {
        "reference"
    }

    fn priority(&self) -> i32 {
        40
    }

    async fn visit_reference(
        &self,
        reference: &mut Reference,
        _context: &mut TransformContext,
    ) -> Result<()> {
        let Some(deferred) = reference.deferred.take() else {
            let link = self.format(reference);
            reference.meta.insert(LINK_KEY.to_string(), Value::Object(link));
            return Ok(());
        };

        tracing::debug!(uri = %reference.uri(), "Awaiting deferred reference");
        match deferred.resolve().await {
            Ok(value) => {
                reference.resolved = Some(value.clone());
                let mut link = self.format(reference);
                if let Value::Object(payload) = value {
                    let keep_link = MergeOptions::new()
                        .with_conflict_strategy(ConflictStrategy::FirstWins);
                    link = merge_objects(&link, &payload, &keep_link);
                }
                reference.meta.insert(LINK_KEY.to_string(), Value::Object(link));
                Ok(())
            }
            Err(err) => {
                let mut link = unresolved_link(reference);
                link.insert("error".to_string(), Value::String(err.to_string()));
                reference.meta.insert(LINK_KEY.to_string(), Value::Object(link));
                Err(err.into())
            }
        }
    }
}
