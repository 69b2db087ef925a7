use promptdoc_engine::ProcessedDocument;

use super::{OutputAdapter, RenderedOutput};
use crate::context::TransformContext;
use crate::error::Result;

pub const GENERIC_FORMAT: &str = "generic";

/// Fallback adapter: the whole transformed document as structured data.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericAdapter;

impl OutputAdapter for GenericAdapter {
    fn format(&self) -> &str {
        GENERIC_FORMAT
    }

    fn description(&self) -> &str {
        "Transformed document as structured data"
    }

    fn render(&self, document: &ProcessedDocument, _context: &TransformContext) -> Result<RenderedOutput> {
        Ok(RenderedOutput::Structured(serde_json::to_value(document)?))
    }
}
