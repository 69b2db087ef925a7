//! Tag schema: definitions, validation and the built-in prompt vocabulary.
//!
//! A [`TagRegistry`] declares which attributes and children each tag
//! accepts. The [`Validator`] walks a document against it and reports
//! issues as a [`ValidationResult`].

mod registry;
mod validator;

use serde::{Deserialize, Serialize};

use crate::ast::Position;

pub use registry::{
    AttributeDefinition, AttributeSpec, AttributeType, CustomValidator, TagDefinition,
    TagRegistry, GLOBAL_ATTRIBUTES,
};
pub use validator::{codes, Validator};

/// One schema violation or warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl ValidationIssue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

/// Outcome of validating a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationIssue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationIssue>,
}

/// Default schema for the AI-prompt vocabulary.
pub fn prompt_schema() -> TagRegistry {
    // Tags allowed inside a section
    let blocks = [
        "prompt", "role", "task", "context", "example", "constraint", "output-format",
        "section", "list", "table", "code", "var",
    ];

    let mut registry = TagRegistry::new();
    registry.register(
        "document",
        TagDefinition::new()
            .with_attribute(
                "mode",
                AttributeDefinition::new(AttributeType::String).one_of(&["strict", "loose"]),
            )
            .with_attribute("lang", AttributeDefinition::new(AttributeType::String))
            .with_attribute("schema", AttributeDefinition::new(AttributeType::String))
            .with_attribute("version", AttributeDefinition::new(AttributeType::String)),
    );
    registry.register(
        "prompt",
        TagDefinition::new().with_attribute_names(&["name", "version", "description"]),
    );
    registry.register("role", TagDefinition::new().with_attribute_names(&["name", "expertise"]));
    registry.register(
        "task",
        TagDefinition::new().with_attribute(
            "priority",
            AttributeDefinition::new(AttributeType::Number),
        ),
    );
    registry.register("context", TagDefinition::new().with_attribute_names(&["source"]));
    registry.register(
        "example",
        TagDefinition::new().with_attribute_names(&["title", "input", "output"]),
    );
    registry.register(
        "constraint",
        TagDefinition::new().with_attribute(
            "level",
            AttributeDefinition::new(AttributeType::String)
                .with_default("must")
                .one_of(&["must", "should", "may"]),
        ),
    );
    registry.register(
        "output-format",
        TagDefinition::new().with_attribute(
            "format",
            AttributeDefinition::new(AttributeType::String)
                .required()
                .one_of(&["json", "xml", "markdown", "text"]),
        ),
    );
    registry.register(
        "section",
        TagDefinition::new()
            .with_attribute_names(&["title"])
            .with_children(&blocks)
            .with_content_format("markdown"),
    );
    registry.register(
        "list",
        TagDefinition::new()
            .with_attribute(
                "ordered",
                AttributeDefinition::new(AttributeType::Boolean).with_default("false"),
            )
            .with_children(&["item"]),
    );
    registry.register("item", TagDefinition::new().with_attribute_names(&[]));
    registry.register(
        "table",
        TagDefinition::new()
            .with_attribute_names(&["caption"])
            .with_children(&["row"]),
    );
    registry.register(
        "row",
        TagDefinition::new()
            .with_attribute_names(&["header"])
            .with_children(&["cell"]),
    );
    registry.register("cell", TagDefinition::new().with_attribute_names(&[]));
    registry.register(
        "code",
        TagDefinition::new()
            .with_attribute_names(&["lang"])
            .with_content_format("code"),
    );
    registry.register(
        "var",
        TagDefinition::new()
            .with_attribute("name", AttributeDefinition::new(AttributeType::String).required())
            .with_attribute("default", AttributeDefinition::new(AttributeType::String))
            .self_closing(),
    );

    tracing::trace!(tags = registry.tag_names().len(), "Built prompt schema");
    registry
}
