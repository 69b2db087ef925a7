//! Built-in processors for the prompt vocabulary.

mod prompt;
mod rules;

pub use prompt::{ContextProcessor, ExampleProcessor, PromptProcessor, RoleProcessor, TaskProcessor};
pub use rules::{ConstraintProcessor, OutputFormatProcessor, VarProcessor, DECLARED_VARIABLES};
