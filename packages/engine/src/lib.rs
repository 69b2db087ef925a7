//! promptdoc engine
//!
//! The processing stage of the promptdoc pipeline. Takes a parsed markup
//! tree and:
//! - Validates it against a tag schema
//! - Resolves `id:`, `file:` and `http(s):` references, cached per document
//! - Applies `extends` inheritance with cycle detection
//! - Extracts per-tag semantics through registered tag processors
//!
//! Errors are graded by severity and handled under a strict or loose
//! policy; a loose run returns a document annotated with what it recovered
//! from.
//!
//! # Example
//!
//! ```
//! use promptdoc_engine::{xml, Processor, ProcessorConfig};
//!
//! let document = xml::parse_document(
//!     r#"<prompt>
//!          <role id="base" expertise="law">Legal advisor</role>
//!          <role extends="id:base" name="counsel"/>
//!          <task>Answer the question</task>
//!        </prompt>"#,
//! )?;
//!
//! let processor = Processor::new(ProcessorConfig::default());
//! let processed = processor.process_blocking(document)?;
//!
//! let roles: Vec<_> = processed.document.elements().into_iter()
//!     .filter(|e| e.tag_name == "role")
//!     .collect();
//! assert_eq!(roles[1].attribute_str("expertise"), Some("law"));
//! assert_eq!(roles[1].text(), "Legal advisor");
//! # Ok::<(), promptdoc_engine::ProcessError>(())
//! ```

pub mod ast;
pub mod config;
pub mod context;
pub mod error;
pub mod error_handler;
pub mod processor;
pub mod protocols;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod uri;
pub mod visitors;
pub mod xml;

// Re-export commonly used items
pub use ast::{
    Annotations, Attributes, BoxFuture, Content, Deferred, Document, Element, Location, Node,
    NodeKind, Position, ProcessedDocument, Reference,
};
pub use config::ProcessorConfig;
pub use context::{DocumentMode, ProcessingContext};
pub use error::{ProcessError, ProcessingError, Result, Severity};
pub use error_handler::{ErrorCallback, ErrorHandler};
pub use processor::{ProcessingState, Processor};
pub use protocols::ProtocolHandler;
pub use registry::{TagProcessor, TagProcessorRegistry};
pub use resolver::{ReferenceResolver, ResolvedReference};
pub use schema::{TagRegistry, ValidationIssue, ValidationResult, Validator};
pub use uri::ReferenceUri;
pub use visitors::NodeVisitor;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
