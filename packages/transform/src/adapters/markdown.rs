//! Markdown rendering of prompt documents.
//!
//! | element                                    | markdown                        |
//! |--------------------------------------------|---------------------------------|
//! | `prompt`                                   | `# name` and description        |
//! | `section`                                  | heading one level deeper        |
//! | `role`, `task`, `context`, `output-format` | titled heading and paragraph    |
//! | `constraint`                               | `- **LEVEL**: text`, grouped    |
//! | `list`                                     | ordered or bullet list          |
//! | `table`                                    | pipe table, first row as header |
//! | `code`                                     | fenced block                    |
//! | `example`                                  | `### Example` with input/output |
//!
//! Other elements render their text as a paragraph.

use promptdoc_engine::visitors::DOCUMENT_METADATA_KEYS;
use promptdoc_engine::{Element, Node, ProcessedDocument};
use serde_json::{Map, Value};

use super::{
    block_children, collapse_whitespace, content_text, inline_text, reference_href,
    substituted_value, value_text, OutputAdapter, RenderedOutput,
};
use crate::context::TransformContext;
use crate::error::Result;
use crate::processors::{code_body, DEFAULT_CODE_LANGUAGE};

/// Renders prompt documents as Markdown, optionally with YAML front matter.
#[derive(Debug, Clone)]
pub struct MarkdownAdapter {
    front_matter: bool,
}

impl Default for MarkdownAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownAdapter {
    pub fn new() -> Self {
        Self { front_matter: true }
    }

    /// Emit document metadata (mode, lang, schema, version) as front matter.
    pub fn with_front_matter(mut self, enabled: bool) -> Self {
        self.front_matter = enabled;
        self
    }

    fn front_matter(&self, document: &ProcessedDocument) -> Result<Option<String>> {
        if !self.front_matter {
            return Ok(None);
        }
        let fields: Map<String, Value> = DOCUMENT_METADATA_KEYS
            .iter()
            .filter_map(|key| {
                document
                    .metadata
                    .get(*key)
                    .filter(|value| !value.is_object() && !value.is_array() && !value.is_null())
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect();
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_yaml_ng::to_string(&fields)?))
    }
}

impl OutputAdapter for MarkdownAdapter {
    fn format(&self) -> &str {
        "markdown"
    }

    fn description(&self) -> &str {
        "Markdown with optional YAML front matter"
    }

    fn render(&self, document: &ProcessedDocument, _context: &TransformContext) -> Result<RenderedOutput> {
        let mut blocks = Vec::new();
        render_nodes(&document.document.children, 0, &mut blocks);

        let mut out = String::new();
        if let Some(yaml) = self.front_matter(document)? {
            out.push_str("---\n");
            out.push_str(&yaml);
            if !yaml.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("---\n\n");
        }
        out.push_str(&blocks.join("\n\n"));
        out.push('\n');
        Ok(RenderedOutput::Text(out))
    }
}

fn heading(level: usize, title: &str) -> String {
    format!("{} {title}", "#".repeat(level.clamp(1, 6)))
}

fn title_case(tag: &str) -> String {
    tag.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn push_paragraph(text: String, blocks: &mut Vec<String>) {
    if !text.is_empty() {
        blocks.push(text);
    }
}

/// Renders sibling nodes; consecutive constraints share one list.
fn render_nodes(nodes: &[Node], depth: usize, blocks: &mut Vec<String>) {
    let mut constraints: Vec<String> = Vec::new();
    for node in nodes {
        if let Node::Element(element) = node {
            if element.tag_name == "constraint" && substituted_value(element).is_none() {
                constraints.push(constraint_item(element));
                continue;
            }
        }
        if !constraints.is_empty() {
            blocks.push(constraints.join("\n"));
            constraints.clear();
        }
        match node {
            Node::Element(element) => render_element(element, depth, blocks),
            Node::Content(content) => {
                push_paragraph(collapse_whitespace(content_text(content)), blocks);
            }
            Node::Reference(reference) => {
                let href = reference_href(reference);
                blocks.push(format!("[{}]({href})", reference.uri()));
            }
        }
    }
    if !constraints.is_empty() {
        blocks.push(constraints.join("\n"));
    }
}

fn render_element(element: &Element, depth: usize, blocks: &mut Vec<String>) {
    if let Some(value) = substituted_value(element) {
        push_paragraph(value_text(value), blocks);
        return;
    }

    match element.tag_name.as_str() {
        "document" => render_nodes(&element.children, depth, blocks),
        "prompt" => {
            if let Some(name) = element.attribute_str("name") {
                blocks.push(heading(1, name));
            }
            if let Some(description) = element.attribute_str("description") {
                push_paragraph(collapse_whitespace(description), blocks);
            }
            render_nodes(&element.children, depth + 1, blocks);
        }
        "section" => {
            let title = element.attribute_str("title").unwrap_or("Section");
            blocks.push(heading(depth + 1, title));
            render_nodes(&element.children, depth + 1, blocks);
        }
        "role" | "task" | "context" | "output-format" => {
            let mut title = title_case(&element.tag_name);
            let qualifier = match element.tag_name.as_str() {
                "role" => element.attribute_str("name"),
                "output-format" => element.attribute_str("format"),
                _ => None,
            };
            if let Some(qualifier) = qualifier {
                title.push_str(&format!(": {qualifier}"));
            }
            blocks.push(heading((depth + 1).max(2), &title));
            render_body(element, depth + 1, blocks);
        }
        "list" => {
            let ordered = element.attribute_str("ordered") == Some("true");
            let items: Vec<String> = element
                .child_elements()
                .filter(|e| e.tag_name == "item")
                .enumerate()
                .map(|(i, item)| {
                    let text = inline_text(&item.children, true);
                    if ordered {
                        format!("{}. {text}", i + 1)
                    } else {
                        format!("- {text}")
                    }
                })
                .collect();
            if !items.is_empty() {
                blocks.push(items.join("\n"));
            }
        }
        "table" => {
            if let Some(table) = render_table(element) {
                blocks.push(table);
            }
        }
        "code" => {
            let language = element
                .meta
                .get("language")
                .and_then(Value::as_str)
                .or_else(|| element.attribute_str("lang"))
                .unwrap_or(DEFAULT_CODE_LANGUAGE);
            blocks.push(format!("```{language}\n{}\n```", code_body(&element.text())));
        }
        "example" => {
            let title = match element.attribute_str("title") {
                Some(title) => format!("Example: {title}"),
                None => "Example".to_string(),
            };
            blocks.push(heading((depth + 1).max(3), &title));
            if let Some(input) = element.attribute_str("input") {
                blocks.push(format!("**Input:** {}", collapse_whitespace(input)));
            }
            if let Some(output) = element.attribute_str("output") {
                blocks.push(format!("**Output:** {}", collapse_whitespace(output)));
            }
            render_body(element, depth + 1, blocks);
        }
        _ => render_body(element, depth, blocks),
    }
}

/// Direct text as a paragraph, followed by block children.
fn render_body(element: &Element, depth: usize, blocks: &mut Vec<String>) {
    if block_children(element).next().is_none() {
        push_paragraph(inline_text(&element.children, false), blocks);
    } else {
        render_nodes(&element.children, depth, blocks);
    }
}

fn constraint_item(element: &Element) -> String {
    let level = element.attribute_str("level").unwrap_or("must").to_uppercase();
    format!("- **{level}**: {}", inline_text(&element.children, true))
}

fn render_table(table: &Element) -> Option<String> {
    let rows: Vec<Vec<String>> = table
        .child_elements()
        .filter(|e| e.tag_name == "row")
        .map(|row| {
            row.child_elements()
                .filter(|e| e.tag_name == "cell")
                .map(|cell| inline_text(&cell.children, true).replace('|', "\\|"))
                .collect()
        })
        .collect();
    let width = rows.iter().map(Vec::len).max().filter(|w| *w > 0)?;

    let line = |cells: &[String]| {
        let mut padded: Vec<&str> = cells.iter().map(String::as_str).collect();
        padded.resize(width, "");
        format!("| {} |", padded.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    if let Some(caption) = table.attribute_str("caption") {
        lines.push(format!("**{}**", collapse_whitespace(caption)));
        lines.push(String::new());
    }
    for (i, row) in rows.iter().enumerate() {
        lines.push(line(row));
        if i == 0 {
            lines.push(format!("|{}", " --- |".repeat(width)));
        }
    }
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptdoc_engine::Document;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render(adapter: &MarkdownAdapter, processed: &ProcessedDocument) -> String {
        adapter
            .render(processed, &TransformContext::new())
            .unwrap()
            .to_string()
    }

    fn processed(root: Element) -> ProcessedDocument {
        ProcessedDocument::new(Document::new(vec![root.into()]))
    }

    #[test]
    fn test_prompt_layout() {
        let root = Element::new("prompt")
            .with_attribute("name", "Reviewer")
            .with_attribute("description", "Reviews pull requests")
            .with_child(Element::new("role").with_attribute("name", "critic").with_text("A careful reader"))
            .with_child(Element::new("task").with_text("\n  Review the diff\n"))
            .with_child(Element::new("constraint").with_attribute("level", "must").with_text("Be kind"))
            .with_child(Element::new("constraint").with_attribute("level", "should").with_text("Be brief"))
            .with_child(
                Element::new("section")
                    .with_attribute("title", "Checklist")
                    .with_child(
                        Element::new("list")
                            .with_attribute("ordered", "true")
                            .with_child(Element::new("item").with_text("Tests"))
                            .with_child(Element::new("item").with_text("Docs")),
                    ),
            );

        let expected = "# Reviewer\n\n\
            Reviews pull requests\n\n\
            ## Role: critic\n\n\
            A careful reader\n\n\
            ## Task\n\n\
            Review the diff\n\n\
            - **MUST**: Be kind\n- **SHOULD**: Be brief\n\n\
            ## Checklist\n\n\
            1. Tests\n2. Docs\n";
        assert_eq!(render(&MarkdownAdapter::new(), &processed(root)), expected);
    }

    #[test]
    fn test_code_and_table() {
        let mut code = Element::new("code").with_attribute("lang", "Rust").with_text("\nfn main() {}\n  ");
        code.meta.insert("language".to_string(), json!("rust"));
        let table = Element::new("table")
            .with_child(
                Element::new("row")
                    .with_child(Element::new("cell").with_text("Name"))
                    .with_child(Element::new("cell").with_text("Role")),
            )
            .with_child(Element::new("row").with_child(Element::new("cell").with_text("Ada")));
        let root = Element::new("section").with_child(code).with_child(table);

        let text = render(&MarkdownAdapter::new(), &processed(root));
        assert!(text.contains("```rust\nfn main() {}\n```"));
        assert!(text.contains("| Name | Role |\n| --- | --- |\n| Ada |  |"));
    }

    #[test]
    fn test_front_matter() {
        let mut document = processed(Element::new("task").with_text("Go"));
        document.metadata.insert("mode".to_string(), json!("loose"));
        document.metadata.insert("lang".to_string(), json!("en"));
        document.metadata.insert("validationErrors".to_string(), json!([]));

        let text = render(&MarkdownAdapter::new(), &document);
        assert!(text.starts_with("---\n"));
        assert!(text.contains("mode: loose\n"));
        assert!(text.contains("lang: en\n"));
        assert!(!text.contains("validationErrors"));
        assert!(text.ends_with("---\n\n## Task\n\nGo\n"));

        let plain = render(&MarkdownAdapter::new().with_front_matter(false), &document);
        assert_eq!(plain, "## Task\n\nGo\n");
    }

    #[test]
    fn test_example_and_unknown() {
        let root = Element::new("prompt")
            .with_child(
                Element::new("example")
                    .with_attribute("title", "Greeting")
                    .with_attribute("input", "hi")
                    .with_attribute("output", "hello"),
            )
            .with_child(Element::new("note").with_text("Plain words"));

        let text = render(&MarkdownAdapter::new(), &processed(root));
        assert_eq!(
            text,
            "### Example: Greeting\n\n**Input:** hi\n\n**Output:** hello\n\nPlain words\n"
        );
    }
}
