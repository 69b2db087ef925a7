//! Processing-time tag processors.
//!
//! Processors are registered per tag name and dispatched by the
//! [`TagProcessorVisitor`](crate::visitors::TagProcessorVisitor). Every
//! processor goes through the same template ([`run_tag_processor`]), so the
//! metadata they produce has one shape regardless of the tag.

mod config;
mod core;
mod handler;
pub mod handlers;

pub use config::create_default_registry;
pub use core::TagProcessorRegistry;
pub use handler::{append_issues, pick_attributes, run_tag_processor, trimmed_text, TagProcessor, SEMANTIC_KEY};
