//! Tag definitions: which attributes and children each tag accepts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ValidationIssue;
use crate::ast::Element;
use crate::error::Result;

/// Attributes every tag accepts regardless of its definition.
pub const GLOBAL_ATTRIBUTES: [&str; 3] = ["id", "extends", "mode"];

/// Value type of an attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    #[default]
    String,
    Number,
    Boolean,
    Object,
}

/// Rich definition of a single attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    #[serde(rename = "type", default)]
    pub attr_type: AttributeType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Closed set of allowed string values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

impl AttributeDefinition {
    pub fn new(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

/// Allowed attributes, in either of the two accepted shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeSpec {
    /// Plain list of allowed names.
    Names(Vec<String>),
    /// Map of name to definition.
    Definitions(BTreeMap<String, AttributeDefinition>),
}

impl AttributeSpec {
    pub fn allows(&self, name: &str) -> bool {
        match self {
            AttributeSpec::Names(names) => names.iter().any(|n| n == name),
            AttributeSpec::Definitions(defs) => defs.contains_key(name),
        }
    }

    pub fn definition(&self, name: &str) -> Option<&AttributeDefinition> {
        match self {
            AttributeSpec::Names(_) => None,
            AttributeSpec::Definitions(defs) => defs.get(name),
        }
    }

    /// Names marked `required` in the definition map.
    pub fn required_names(&self) -> Vec<&str> {
        match self {
            AttributeSpec::Names(_) => Vec::new(),
            AttributeSpec::Definitions(defs) => defs
                .iter()
                .filter(|(_, d)| d.required)
                .map(|(n, _)| n.as_str())
                .collect(),
        }
    }
}

/// Custom validation hook attached to a tag.
#[derive(Clone)]
pub struct CustomValidator(Arc<dyn Fn(&Element) -> Vec<ValidationIssue> + Send + Sync>);

impl CustomValidator {
    pub fn new(f: impl Fn(&Element) -> Vec<ValidationIssue> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, element: &Element) -> Vec<ValidationIssue> {
        (self.0)(element)
    }
}

impl fmt::Debug for CustomValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomValidator(..)")
    }
}

/// Definition of one tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDefinition {
    /// `None` means any attribute is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_attributes: Vec<String>,
    /// `None` means any child tag is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_children: Option<Vec<String>>,
    #[serde(default)]
    pub self_closing: bool,
    /// Hint for renderers (e.g. "markdown", "code").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_format: Option<String>,
    #[serde(skip)]
    pub validate: Option<CustomValidator>,
}

impl TagDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute_names(mut self, names: &[&str]) -> Self {
        self.attributes = Some(AttributeSpec::Names(
            names.iter().map(|n| n.to_string()).collect(),
        ));
        self
    }

    pub fn with_attribute(mut self, name: &str, definition: AttributeDefinition) -> Self {
        match &mut self.attributes {
            Some(AttributeSpec::Definitions(defs)) => {
                defs.insert(name.to_string(), definition);
            }
            Some(AttributeSpec::Names(names)) => {
                // Upgrade the name list to definitions, keeping existing names
                let mut defs: BTreeMap<String, AttributeDefinition> = names
                    .iter()
                    .map(|n| (n.clone(), AttributeDefinition::default()))
                    .collect();
                defs.insert(name.to_string(), definition);
                self.attributes = Some(AttributeSpec::Definitions(defs));
            }
            None => {
                let mut defs = BTreeMap::new();
                defs.insert(name.to_string(), definition);
                self.attributes = Some(AttributeSpec::Definitions(defs));
            }
        }
        self
    }

    pub fn with_required(mut self, names: &[&str]) -> Self {
        self.required_attributes
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_children(mut self, tags: &[&str]) -> Self {
        self.allowed_children = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn self_closing(mut self) -> Self {
        self.self_closing = true;
        self
    }

    pub fn with_content_format(mut self, format: impl Into<String>) -> Self {
        self.content_format = Some(format.into());
        self
    }

    pub fn with_validator(mut self, validator: CustomValidator) -> Self {
        self.validate = Some(validator);
        self
    }

    /// All required attribute names from both sources, deduplicated.
    pub fn all_required(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let from_spec = self
            .attributes
            .as_ref()
            .map(AttributeSpec::required_names)
            .unwrap_or_default();
        self.required_attributes
            .iter()
            .map(String::as_str)
            .chain(from_spec)
            .filter(|n| seen.insert(*n))
            .collect()
    }
}

/// Registry of tag definitions, shared read-only between documents.
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    tags: HashMap<String, TagDefinition>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any previous one for the tag.
    pub fn register(&mut self, tag_name: impl Into<String>, definition: TagDefinition) {
        self.tags.insert(tag_name.into(), definition);
    }

    pub fn get(&self, tag_name: &str) -> Option<&TagDefinition> {
        self.tags.get(tag_name)
    }

    pub fn contains(&self, tag_name: &str) -> bool {
        self.tags.contains_key(tag_name)
    }

    /// Registered tag names, sorted.
    pub fn tag_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tags.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Load definitions from a JSON object of `tagName -> definition`.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Json` for malformed input.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let tags: HashMap<String, TagDefinition> = serde_json::from_str(json)?;
        Ok(Self { tags })
    }

    /// Load definitions from a YAML mapping of `tagName -> definition`.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Yaml` for malformed input.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let tags: HashMap<String, TagDefinition> = serde_yaml_ng::from_str(yaml)?;
        Ok(Self { tags })
    }

    /// Fill in declared attribute defaults that the element omits.
    pub fn apply_defaults(&self, element: &mut Element) {
        let Some(AttributeSpec::Definitions(defs)) =
            self.get(&element.tag_name).and_then(|d| d.attributes.as_ref())
        else {
            return;
        };
        for (name, def) in defs {
            if let Some(default) = &def.default {
                element
                    .attributes
                    .entry(name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
    }
}
