//! Transform-stage visitors.
//!
//! The [`Transformer`](crate::transformer::Transformer) walks the processed
//! tree once, depth first. At every node each active visitor runs in
//! descending priority; children are visited after their element has been
//! seen by every visitor.
//!
//! | visitor                   | priority |
//! |---------------------------|----------|
//! | [`UnknownElementVisitor`] | 100      |
//! | [`SemanticTagVisitor`]    | 80       |
//! | [`ContentVisitor`]        | 60       |
//! | [`ReferenceVisitor`]      | 40       |

mod content;
mod reference;
mod semantic;
mod unknown;

use async_trait::async_trait;
use promptdoc_engine::{Content, Element, Reference};

use crate::context::TransformContext;
use crate::error::Result;

pub use content::{
    decode_entities, default_format_handlers, ContentVisitor, FormatHandler, FormatSpan,
    FormatTarget, PatternFormat, DECODE_ENTITIES_VARIABLE, PARSE_INLINE_FORMATTING_VARIABLE,
};
pub use reference::{default_link, unresolved_link, LinkFormatter, ReferenceVisitor, LINK_KEY};
pub use semantic::SemanticTagVisitor;
pub use unknown::{TagPredicate, TagReplacer, UnknownElementVisitor, DEFAULT_REPLACEMENT_TAG};

/// One transform concern. Hooks default to doing nothing.
#[async_trait]
pub trait TransformVisitor: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs earlier at each node.
    fn priority(&self) -> i32 {
        0
    }

    async fn visit_element(
        &self,
        _element: &mut Element,
        _context: &mut TransformContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn visit_content(
        &self,
        _content: &mut Content,
        _context: &mut TransformContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn visit_reference(
        &self,
        _reference: &mut Reference,
        _context: &mut TransformContext,
    ) -> Result<()> {
        Ok(())
    }
}
