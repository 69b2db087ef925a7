//! Tag processor trait and the shared processing template.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::ast::{Attributes, Element};
use crate::context::ProcessingContext;
use crate::error::{ProcessingError, Result, Severity};

/// Metadata key holding the semantic extraction result.
pub const SEMANTIC_KEY: &str = "semantic";

/// Processing-time extension unit for one tag.
///
/// Implementors only describe what is specific to their tag. The shape of
/// the resulting metadata is fixed by [`run_tag_processor`].
#[async_trait]
pub trait TagProcessor: Send + Sync {
    fn tag_name(&self) -> &str;

    /// Higher runs first when several processors accept an element.
    fn priority(&self) -> i32 {
        0
    }

    fn can_process(&self, element: &Element) -> bool {
        element.tag_name == self.tag_name()
    }

    /// Turn the element's attributes (without `id` and `extends`) into
    /// semantic fields.
    fn extract_attributes(
        &self,
        attributes: &Attributes,
        element: &Element,
        context: &ProcessingContext,
    ) -> Result<Map<String, Value>>;

    /// Tag-specific checks on the extracted fields.
    fn validate(&self, _element: &Element, _semantic: &Map<String, Value>) -> Vec<ProcessingError> {
        Vec::new()
    }

    /// Hook run after metadata has been assembled. May suspend.
    async fn post_process(
        &self,
        _element: &mut Element,
        _context: &mut ProcessingContext,
    ) -> Result<()> {
        Ok(())
    }
}

/// Run a processor over an element.
///
/// Resulting metadata:
///
/// ```text
/// metadata.semantic      = { type, id, ...fields, extends? }
/// metadata.errors        = [..]   (only when validate reported errors)
/// metadata.warnings      = [..]   (only when validate reported warnings)
/// metadata.processed     = true
/// metadata.processorName = <tag name>
/// ```
///
/// `extends` is recorded as-is; inheritance is resolved elsewhere.
///
/// # Errors
///
/// Propagates failures from `extract_attributes` and `post_process`.
pub async fn run_tag_processor(
    processor: &dyn TagProcessor,
    element: &mut Element,
    context: &mut ProcessingContext,
) -> Result<()> {
    let mut attributes = element.attributes.clone();
    let id = attributes.remove("id");
    let extends = attributes.remove("extends");

    let fields = processor.extract_attributes(&attributes, element, context)?;

    let mut semantic = Map::new();
    semantic.insert("type".to_string(), Value::String(element.tag_name.clone()));
    semantic.insert("id".to_string(), id.unwrap_or(Value::Null));
    semantic.extend(fields);
    if let Some(extends) = extends {
        semantic.insert("extends".to_string(), extends);
    }

    let issues = processor.validate(element, &semantic);
    let (warnings, errors): (Vec<_>, Vec<_>) = issues
        .into_iter()
        .partition(|issue| issue.severity == Severity::Warning);
    append_issues(element, "errors", errors)?;
    append_issues(element, "warnings", warnings)?;

    element
        .metadata
        .insert(SEMANTIC_KEY.to_string(), Value::Object(semantic));

    processor.post_process(element, context).await?;

    element
        .metadata
        .insert("processed".to_string(), Value::Bool(true));
    element.metadata.insert(
        "processorName".to_string(),
        Value::String(processor.tag_name().to_string()),
    );
    Ok(())
}

/// Append issues to an array in `element.metadata`, creating it on demand.
pub fn append_issues(element: &mut Element, key: &str, issues: Vec<ProcessingError>) -> Result<()> {
    if issues.is_empty() {
        return Ok(());
    }
    let entry = element
        .metadata
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    if let Value::Array(list) = entry {
        for issue in issues {
            list.push(serde_json::to_value(issue)?);
        }
    }
    Ok(())
}

/// Copy the named string attributes into a field map.
pub fn pick_attributes(attributes: &Attributes, names: &[&str]) -> Map<String, Value> {
    names
        .iter()
        .filter_map(|name| {
            attributes
                .get(*name)
                .map(|value| (name.to_string(), value.clone()))
        })
        .collect()
}

/// Trimmed text content, or `None` when blank.
pub fn trimmed_text(element: &Element) -> Option<String> {
    let text = element.text();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
