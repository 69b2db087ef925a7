//! `extends` resolution
//!
//! An element with `extends="protocol:path[#fragment]"` inherits from the
//! referenced base element:
//!
//! - **Attributes**: the child wins for scalars (arrays count as scalars);
//!   object values are shallow-merged with the child's keys on top; keys
//!   only the base has are added. The base's own `id` and `extends` are
//!   never copied, and the child's `extends` is kept verbatim.
//! - **Children**: adopted from the base only when the child has none.
//!
//! Bases may themselves extend other elements; the chain is followed
//! recursively. The chain of targets currently being followed lives in the
//! context; meeting a target twice is a cycle.
//!
//! The base element is never mutated: `id:` bases are copies taken from
//! the id index, other bases are deserialized from resolver output.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::NodeVisitor;
use crate::ast::{Attributes, BoxFuture, Document, Element};
use crate::config::MAX_INHERITANCE_DEPTH;
use crate::context::ProcessingContext;
use crate::error::{ProcessError, Result};
use crate::resolver::ReferenceResolver;
use crate::uri::ReferenceUri;

/// Metadata key recording the base an element inherited from.
pub const INHERITED_FROM_KEY: &str = "inheritedFrom";

/// Applies `extends` inheritance.
#[derive(Debug, Clone)]
pub struct InheritanceVisitor {
    resolver: Arc<ReferenceResolver>,
}

impl InheritanceVisitor {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self { resolver }
    }

    /// Resolve the fully inherited base for an `extends` value.
    fn resolve_base<'a>(
        &'a self,
        extends: &'a str,
        context: &'a mut ProcessingContext,
    ) -> BoxFuture<'a, Result<Element>> {
        Box::pin(async move {
            let uri = ReferenceUri::parse(extends)?;
            let key = uri.uri().to_string();

            if context.is_inheriting_from(&key) {
                let mut chain = context.inheritance_chain().to_vec();
                chain.push(key.clone());
                tracing::warn!(uri = %key, chain = ?chain, "Circular inheritance detected");
                return Err(ProcessError::CircularReference { uri: key, chain });
            }
            if context.inheritance_chain().len() >= MAX_INHERITANCE_DEPTH {
                let chain = context.inheritance_chain().to_vec();
                tracing::warn!(uri = %key, depth = chain.len(), "Inheritance depth exceeded");
                return Err(ProcessError::CircularReference { uri: key, chain });
            }

            context.enter_inheritance(key.clone());
            let result = self.load_inherited(&uri, context).await;
            context.leave_inheritance(&key);
            result
        })
    }

    async fn load_inherited(
        &self,
        uri: &ReferenceUri,
        context: &mut ProcessingContext,
    ) -> Result<Element> {
        let mut base = self.load_base(uri, context).await?;

        if let Some(grand) = base.attribute_str("extends").map(str::to_string) {
            let ancestor = self.resolve_base(&grand, context).await?;
            merge_inherited(&mut base, &ancestor);
        }
        Ok(base)
    }

    /// Fetch the base element, without following its own `extends`.
    async fn load_base(&self, uri: &ReferenceUri, context: &mut ProcessingContext) -> Result<Element> {
        let not_found = |source: ProcessError| ProcessError::ReferenceNotFound {
            uri: uri.key(),
            source: Box::new(source),
        };

        let base = if uri.protocol() == "id" {
            context
                .element_by_id(uri.path())
                .cloned()
                .ok_or_else(|| not_found(ProcessError::UnknownId(uri.path().to_string())))?
        } else {
            let resolved = self.resolver.resolve(&uri.to_reference(), context).await?;
            element_from_value(resolved.value).map_err(not_found)?
        };

        match uri.fragment() {
            None => Ok(base),
            Some(fragment) => base
                .find_by_id(fragment)
                .cloned()
                .ok_or_else(|| not_found(ProcessError::UnknownId(fragment.to_string()))),
        }
    }
}

/// Interpret a resolved value as an element: either a serialized element
/// or a serialized document, whose root element is used.
fn element_from_value(value: Value) -> Result<Element> {
    let is_element = value.get("tagName").is_some();
    let is_document = value.get("children").is_some();
    if is_element {
        Ok(serde_json::from_value(value)?)
    } else if is_document {
        let document: Document = serde_json::from_value(value)?;
        document
            .root_element()
            .cloned()
            .ok_or_else(|| ProcessError::InvalidMarkup("referenced document is empty".to_string()))
    } else {
        Err(ProcessError::InvalidMarkup(
            "referenced value is not an element".to_string(),
        ))
    }
}

/// Merge a base element into `element` using the inheritance rules.
pub fn merge_inherited(element: &mut Element, base: &Element) {
    merge_attributes(&mut element.attributes, &base.attributes);
    if element.children.is_empty() && !base.children.is_empty() {
        element.children = base.children.clone();
    }
}

fn merge_attributes(child: &mut Attributes, base: &Attributes) {
    for (name, base_value) in base {
        if name == "id" || name == "extends" {
            continue;
        }
        match (child.get_mut(name), base_value) {
            (None, _) => {
                child.insert(name.clone(), base_value.clone());
            }
            (Some(Value::Object(child_obj)), Value::Object(base_obj)) => {
                for (key, value) in base_obj {
                    child_obj.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
            // Child wins for scalars and arrays
            (Some(_), _) => {}
        }
    }
}

#[async_trait]
impl NodeVisitor for InheritanceVisitor {
    fn name(&self) -> &str {
        "inheritance"
    }

    fn priority(&self) -> i32 {
        90
    }

    async fn visit_element(
        &self,
        element: &mut Element,
        context: &mut ProcessingContext,
    ) -> Result<()> {
        let Some(extends) = element.attribute_str("extends").map(str::to_string) else {
            return Ok(());
        };

        let base = self.resolve_base(&extends, context).await?;
        merge_inherited(element, &base);
        element
            .metadata
            .insert(INHERITED_FROM_KEY.to_string(), Value::String(extends.clone()));
        tracing::debug!(tag = %element.tag_name, extends = %extends, "Applied inheritance");
        Ok(())
    }
}
