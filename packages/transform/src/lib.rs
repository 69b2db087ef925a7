//! promptdoc transform
//!
//! The transform stage of the promptdoc pipeline. Takes a processed
//! document and:
//! - Substitutes template variables and annotates code blocks
//! - Detects inline formatting, links and images, and decodes HTML entities
//! - Renders references as links, awaiting deferred payloads
//! - Marks or renames elements outside the known vocabulary
//!
//! The result is rendered as JSON, XML or Markdown by a pluggable output
//! adapter. Visitor errors either abort the call (strict) or are recorded
//! up to a threshold (loose).
//!
//! # Example
//!
//! ```
//! use promptdoc_transform::{Pipeline, TransformOptions};
//!
//! let outcome = Pipeline::default().run_blocking(
//!     promptdoc_engine::xml::parse_document(
//!         r#"<prompt name="Summarizer">
//!              <role>Editor</role>
//!              <task>Summarize <var name="topic"/></task>
//!              <constraint level="should">Be brief</constraint>
//!            </prompt>"#,
//!     )?,
//!     &TransformOptions::new()
//!         .with_format("markdown")
//!         .with_variable("topic", "the report"),
//! )?;
//!
//! let markdown = outcome.output.map(|o| o.to_string()).unwrap_or_default();
//! assert!(markdown.contains("# Summarizer"));
//! assert!(markdown.contains("## Task\n\nSummarize the report"));
//! assert!(markdown.contains("- **SHOULD**: Be brief"));
//! # Ok::<(), promptdoc_transform::TransformError>(())
//! ```

pub mod adapters;
pub mod config;
pub mod context;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod processors;
pub mod transformer;
pub mod visitors;

// Re-export commonly used items
pub use adapters::{AdapterFactory, AdapterSelector, OutputAdapter, RenderedOutput};
pub use config::{
    ErrorHandling, ThresholdAction, TransformMode, TransformOptions, TransformerConfig,
};
pub use context::TransformContext;
pub use error::{Result, TransformError};
pub use merge::{merge_objects, merge_values, ConflictStrategy, MergeOptions};
pub use pipeline::Pipeline;
pub use processors::{TransformProcessor, TransformProcessorRegistry};
pub use transformer::{TransformIssue, TransformOutcome, Transformer};
pub use visitors::TransformVisitor;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
