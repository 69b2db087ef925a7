use async_trait::async_trait;
use serde_json::Value;

use super::NodeVisitor;
use crate::ast::{Document, Element};
use crate::context::{DocumentMode, ProcessingContext};
use crate::error::{ProcessingError, Result};

/// Root attributes copied into the document metadata.
pub const DOCUMENT_METADATA_KEYS: [&str; 4] = ["mode", "lang", "schema", "version"];

/// Reads document-level attributes and indexes element ids.
///
/// Runs before every other visitor so that the document mode is known
/// before any error policy decision is made.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentMetadataVisitor;

/// Copy the root element's document attributes into the context.
///
/// An unrecognised `mode` leaves the mode undeclared and is reported as a
/// warning.
///
/// # Errors
///
/// Returns a warning-level `ProcessError::Processing` for an invalid mode.
pub fn read_document_metadata(document: &Document, context: &mut ProcessingContext) -> Result<()> {
    let Some(root) = document.root_element() else {
        return Ok(());
    };

    for key in DOCUMENT_METADATA_KEYS {
        if let Some(value) = root.attributes.get(key) {
            context.set_document_metadata(key, value.clone());
        }
    }

    if let Some(mode) = root.attribute_str("mode") {
        match mode.parse::<DocumentMode>() {
            Ok(mode) => context.set_document_mode(mode, true),
            Err(_) => {
                return Err(ProcessingError::warning(format!(
                    "Unknown document mode '{mode}', using {}",
                    context.document_mode()
                ))
                .with_code("INVALID_MODE")
                .with_position(root.position)
                .into());
            }
        }
    }
    Ok(())
}

#[async_trait]
impl NodeVisitor for DocumentMetadataVisitor {
    fn name(&self) -> &str {
        "document-metadata"
    }

    fn priority(&self) -> i32 {
        100
    }

    async fn visit_document(
        &self,
        document: &mut Document,
        context: &mut ProcessingContext,
    ) -> Result<()> {
        read_document_metadata(document, context)
    }

    async fn visit_element(
        &self,
        element: &mut Element,
        context: &mut ProcessingContext,
    ) -> Result<()> {
        let Some(id) = element.id().map(str::to_string) else {
            return Ok(());
        };
        if context.register_id(&id, element) {
            return Ok(());
        }
        element
            .metadata
            .insert("duplicateId".to_string(), Value::Bool(true));
        Err(ProcessingError::warning(format!(
            "Duplicate id '{id}', keeping the first occurrence"
        ))
        .with_code("DUPLICATE_ID")
        .into())
    }
}
