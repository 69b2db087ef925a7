//! Processing-stage visitors.
//!
//! The [`Processor`](crate::processor::Processor) runs each visitor over the
//! whole tree, one full depth-first pass per visitor, in descending
//! priority. Built-in visitors and their priorities:
//!
//! | visitor                        | priority |
//! |--------------------------------|----------|
//! | [`DocumentMetadataVisitor`]    | 100      |
//! | [`InheritanceVisitor`]         | 90       |
//! | [`ReferenceResolutionVisitor`] | 80       |
//! | [`TagProcessorVisitor`]        | 50       |
//!
//! An error returned from a hook is passed through the error handler; a
//! recovered error is attached to the element and the pass continues.

mod inheritance;
mod metadata;
mod references;
mod tags;

use async_trait::async_trait;

use crate::ast::{Content, Document, Element, Reference};
use crate::context::ProcessingContext;
use crate::error::Result;

pub use inheritance::{merge_inherited, InheritanceVisitor};
pub use metadata::{read_document_metadata, DocumentMetadataVisitor, DOCUMENT_METADATA_KEYS};
pub use references::ReferenceResolutionVisitor;
pub use tags::TagProcessorVisitor;

/// One processing pass over the tree.
///
/// All hooks default to doing nothing, so a visitor only implements the
/// node kinds it cares about.
#[async_trait]
pub trait NodeVisitor: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs earlier.
    fn priority(&self) -> i32 {
        0
    }

    async fn visit_document(
        &self,
        _document: &mut Document,
        _context: &mut ProcessingContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn visit_element(
        &self,
        _element: &mut Element,
        _context: &mut ProcessingContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn visit_content(
        &self,
        _content: &mut Content,
        _context: &mut ProcessingContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn visit_reference(
        &self,
        _reference: &mut Reference,
        _context: &mut ProcessingContext,
    ) -> Result<()> {
        Ok(())
    }
}
