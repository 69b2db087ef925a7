//! Default processor registry for the prompt vocabulary.

use super::core::TagProcessorRegistry;
use super::handlers::{
    ConstraintProcessor, ContextProcessor, ExampleProcessor, OutputFormatProcessor,
    PromptProcessor, RoleProcessor, TaskProcessor, VarProcessor,
};

/// Create a registry with processors for every built-in semantic tag.
///
/// Structural tags (`section`, `list`, `table`, ...) carry no semantics of
/// their own and have no processor.
#[must_use]
pub fn create_default_registry() -> TagProcessorRegistry {
    let mut registry = TagProcessorRegistry::new();

    // Prompt structure
    registry.register(PromptProcessor);
    registry.register(RoleProcessor);
    registry.register(TaskProcessor);
    registry.register(ContextProcessor);
    registry.register(ExampleProcessor);

    // Rules
    registry.register(ConstraintProcessor);
    registry.register(OutputFormatProcessor);
    registry.register(VarProcessor);

    registry
}
