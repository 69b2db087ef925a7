//! Validates a document tree against a [`TagRegistry`].

use serde_json::Value;

use super::registry::{AttributeType, TagRegistry, GLOBAL_ATTRIBUTES};
use super::{ValidationIssue, ValidationResult};
use crate::ast::{Document, Element, Node};

/// Error and warning codes produced by the validator.
pub mod codes {
    pub const UNKNOWN_TAG: &str = "UNKNOWN_TAG";
    pub const INVALID_ATTRIBUTE: &str = "INVALID_ATTRIBUTE";
    pub const INVALID_ATTRIBUTE_VALUE: &str = "INVALID_ATTRIBUTE_VALUE";
    pub const MISSING_REQUIRED_ATTRIBUTE: &str = "MISSING_REQUIRED_ATTRIBUTE";
    pub const INVALID_NESTING: &str = "INVALID_NESTING";
    pub const SELF_CLOSING_HAS_CONTENT: &str = "SELF_CLOSING_HAS_CONTENT";
}

/// Walks a document and checks every element against its tag definition.
///
/// Unknown tags produce warnings only: unknown elements are a transform-time
/// concern. Everything else produces errors.
pub struct Validator<'a> {
    registry: &'a TagRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a TagRegistry) -> Self {
        Self { registry }
    }

    pub fn validate(&self, document: &Document) -> ValidationResult {
        let mut result = ValidationResult::default();
        for node in &document.children {
            if let Node::Element(element) = node {
                self.validate_element(element, &mut result);
            }
        }
        result.valid = result.errors.is_empty();
        tracing::debug!(
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "Validated document"
        );
        result
    }

    fn validate_element(&self, element: &Element, result: &mut ValidationResult) {
        let tag = element.tag_name.as_str();

        match self.registry.get(tag) {
            None => result.warnings.push(
                ValidationIssue::new(codes::UNKNOWN_TAG, format!("Unknown tag <{tag}>"))
                    .at(element.position),
            ),
            Some(definition) => {
                // Attribute names and values
                if let Some(spec) = &definition.attributes {
                    for (name, value) in &element.attributes {
                        if GLOBAL_ATTRIBUTES.contains(&name.as_str()) {
                            continue;
                        }
                        if !spec.allows(name) {
                            result.errors.push(
                                ValidationIssue::new(
                                    codes::INVALID_ATTRIBUTE,
                                    format!("Attribute '{name}' is not allowed on <{tag}>"),
                                )
                                .at(element.position),
                            );
                            continue;
                        }
                        if let Some(def) = spec.definition(name) {
                            if let Some(message) = check_value(value, def.attr_type, def.values.as_deref()) {
                                result.errors.push(
                                    ValidationIssue::new(
                                        codes::INVALID_ATTRIBUTE_VALUE,
                                        format!("Attribute '{name}' on <{tag}> {message}"),
                                    )
                                    .at(element.position),
                                );
                            }
                        }
                    }
                }

                for required in definition.all_required() {
                    if !element.attributes.contains_key(required) {
                        result.errors.push(
                            ValidationIssue::new(
                                codes::MISSING_REQUIRED_ATTRIBUTE,
                                format!("Missing required attribute '{required}' on <{tag}>"),
                            )
                            .at(element.position),
                        );
                    }
                }

                if definition.self_closing && !element.children.is_empty() {
                    result.errors.push(
                        ValidationIssue::new(
                            codes::SELF_CLOSING_HAS_CONTENT,
                            format!("<{tag}> is self-closing but has children"),
                        )
                        .at(element.position),
                    );
                }

                if let Some(allowed) = &definition.allowed_children {
                    for child in element.child_elements() {
                        if !allowed.iter().any(|a| a == &child.tag_name) {
                            result.errors.push(
                                ValidationIssue::new(
                                    codes::INVALID_NESTING,
                                    format!("<{}> is not allowed inside <{tag}>", child.tag_name),
                                )
                                .at(child.position),
                            );
                        }
                    }
                }

                if let Some(validator) = &definition.validate {
                    result.errors.extend(validator.call(element));
                }
            }
        }

        for child in element.child_elements() {
            self.validate_element(child, result);
        }
    }
}

/// Check a value against its declared type. Returns a message fragment on mismatch.
fn check_value(value: &Value, attr_type: AttributeType, allowed: Option<&[String]>) -> Option<String> {
    let type_ok = match (attr_type, value) {
        (AttributeType::String, Value::String(_)) => true,
        (AttributeType::Number, Value::Number(_)) => true,
        (AttributeType::Number, Value::String(s)) => s.trim().parse::<f64>().is_ok(),
        (AttributeType::Boolean, Value::Bool(_)) => true,
        (AttributeType::Boolean, Value::String(s)) => matches!(s.as_str(), "true" | "false"),
        (AttributeType::Object, Value::Object(_)) => true,
        _ => false,
    };
    if !type_ok {
        return Some(format!("must be of type {attr_type:?}").to_lowercase());
    }

    if let (Some(allowed), Some(s)) = (allowed, value.as_str()) {
        if !allowed.iter().any(|a| a == s) {
            return Some(format!("must be one of {}, got '{s}'", allowed.join(", ")));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::registry::{AttributeDefinition, CustomValidator, TagDefinition};

    fn registry() -> TagRegistry {
        let mut registry = TagRegistry::new();
        registry.register(
            "prompt",
            TagDefinition::new()
                .with_attribute_names(&["name"])
                .with_required(&["name"])
                .with_children(&["role", "task"]),
        );
        registry.register(
            "task",
            TagDefinition::new().with_attribute(
                "priority",
                AttributeDefinition::new(AttributeType::Number),
            ),
        );
        registry.register(
            "role",
            TagDefinition::new().with_validator(CustomValidator::new(|el| {
                if el.text().trim().is_empty() {
                    vec![ValidationIssue::new("EMPTY_ROLE", "role needs text")]
                } else {
                    Vec::new()
                }
            })),
        );
        registry.register("br", TagDefinition::new().self_closing());
        registry
    }

    fn codes_of(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn test_valid_document() {
        let doc = Document::new(vec![Element::new("prompt")
            .with_attribute("name", "x")
            .with_attribute("id", "p")
            .with_child(Element::new("role").with_text("Helper"))
            .with_child(Element::new("task").with_attribute("priority", "2"))
            .into()]);
        let result = Validator::new(&registry()).validate(&doc);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn test_reports_each_violation() {
        let doc = Document::new(vec![Element::new("prompt")
            .with_attribute("color", "red")
            .with_child(Element::new("role"))
            .with_child(Element::new("task").with_attribute("priority", "high"))
            .with_child(Element::new("br").with_text("oops"))
            .with_child(Element::new("mystery"))
            .into()]);
        let result = Validator::new(&registry()).validate(&doc);

        assert!(!result.valid);
        assert_eq!(
            codes_of(&result.errors),
            vec![
                codes::INVALID_ATTRIBUTE,
                codes::MISSING_REQUIRED_ATTRIBUTE,
                codes::INVALID_NESTING,
                codes::INVALID_NESTING,
                "EMPTY_ROLE",
                codes::INVALID_ATTRIBUTE_VALUE,
                codes::SELF_CLOSING_HAS_CONTENT,
            ]
        );
        assert_eq!(codes_of(&result.warnings), vec![codes::UNKNOWN_TAG]);
    }

    #[test]
    fn test_enum_values() {
        let allowed = vec!["must".to_string(), "may".to_string()];
        assert!(check_value(&Value::String("must".into()), AttributeType::String, Some(&allowed)).is_none());
        assert!(check_value(&Value::String("never".into()), AttributeType::String, Some(&allowed)).is_some());
    }
}
