//! XML import: builds the document tree from an XML rendering of the markup.
//!
//! - elements become [`Element`] nodes with string attributes
//! - non-blank text becomes [`Content`]
//! - `<ref to="protocol:path"/>` becomes a [`Reference`]
//!
//! Positions carry the 1-based line and column and the byte offset of each
//! node in the source.

use roxmltree::{Node as XmlNode, NodeType};
use serde_json::Value;

use crate::ast::{Content, Document, Element, Location, Node, Position};
use crate::config::MAX_DOCUMENT_SIZE;
use crate::error::{ProcessError, Result};
use crate::uri::ReferenceUri;

/// Tag name of the reference element.
pub const REFERENCE_TAG: &str = "ref";

/// Parse XML text into a [`Document`].
///
/// # Errors
///
/// Returns `ProcessError::InvalidMarkup` for malformed XML, oversized input
/// or a `<ref>` without a valid `to` attribute.
///
/// # Examples
/// ```
/// use promptdoc_engine::xml::parse_document;
///
/// let doc = parse_document(r#"<prompt id="p"><task>Summarize</task></prompt>"#).unwrap();
/// let root = doc.root_element().unwrap();
/// assert_eq!(root.tag_name, "prompt");
/// assert_eq!(root.text(), "Summarize");
/// ```
pub fn parse_document(text: &str) -> Result<Document> {
    if text.len() > MAX_DOCUMENT_SIZE {
        return Err(ProcessError::InvalidMarkup(format!(
            "document exceeds maximum size ({} > {} bytes)",
            text.len(),
            MAX_DOCUMENT_SIZE
        )));
    }

    let xml = roxmltree::Document::parse(text)
        .map_err(|e| ProcessError::InvalidMarkup(e.to_string()))?;

    let root = convert_node(&xml, xml.root_element())?;
    let mut document = Document::new(root.into_iter().collect());
    document.position = position_of(&xml, 0..text.len());
    tracing::trace!(bytes = text.len(), "Parsed XML document");
    Ok(document)
}

fn convert_node(xml: &roxmltree::Document<'_>, node: XmlNode<'_, '_>) -> Result<Option<Node>> {
    match node.node_type() {
        NodeType::Element => {
            let tag_name = node.tag_name().name();
            let position = position_of(xml, node.range());

            if tag_name == REFERENCE_TAG {
                let to = node.attribute("to").ok_or_else(|| {
                    ProcessError::InvalidMarkup(format!(
                        "<{REFERENCE_TAG}> without 'to' attribute at line {}",
                        position.start.line
                    ))
                })?;
                let uri = ReferenceUri::parse(to)
                    .map_err(|e| ProcessError::InvalidMarkup(e.to_string()))?;
                let mut reference = uri.to_reference();
                reference.position = position;
                return Ok(Some(reference.into()));
            }

            let mut element = Element::new(tag_name).with_position(position);
            for attr in node.attributes() {
                element
                    .attributes
                    .insert(attr.name().to_string(), Value::String(attr.value().to_string()));
            }
            for child in node.children() {
                if let Some(converted) = convert_node(xml, child)? {
                    element.children.push(converted);
                }
            }
            Ok(Some(element.into()))
        }
        NodeType::Text => {
            let value = node.text().unwrap_or_default();
            if value.trim().is_empty() {
                return Ok(None);
            }
            let mut content = Content::new(value);
            content.position = position_of(xml, node.range());
            Ok(Some(content.into()))
        }
        // Comments and processing instructions carry no content
        _ => Ok(None),
    }
}

fn position_of(xml: &roxmltree::Document<'_>, range: std::ops::Range<usize>) -> Position {
    Position {
        start: location_of(xml, range.start),
        end: location_of(xml, range.end),
    }
}

fn location_of(xml: &roxmltree::Document<'_>, offset: usize) -> Location {
    let pos = xml.text_pos_at(offset);
    Location {
        line: pos.row as usize,
        column: pos.col as usize,
        offset,
    }
}
