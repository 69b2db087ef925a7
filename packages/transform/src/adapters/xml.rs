use promptdoc_engine::{Element, Node, ProcessedDocument};

use super::{
    collapse_whitespace, content_text, substituted_value, value_text, OutputAdapter,
    RenderedOutput,
};
use crate::context::TransformContext;
use crate::error::Result;
use crate::processors::code_body;

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Re-serializes the transformed tree as indented XML.
///
/// Substituted `<var>` elements are written as their value, references as
/// `<ref to="protocol:path"/>`. Elements holding only text stay on one
/// line, except `<code>` bodies, which keep their line breaks. Elements
/// without children are self-closed.
#[derive(Debug, Clone)]
pub struct XmlAdapter {
    indent: usize,
    declaration: bool,
}

impl Default for XmlAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlAdapter {
    pub fn new() -> Self {
        Self {
            indent: 2,
            declaration: true,
        }
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_declaration(mut self, declaration: bool) -> Self {
        self.declaration = declaration;
        self
    }

    fn write_element(&self, element: &Element, depth: usize, out: &mut String) {
        let pad = " ".repeat(depth * self.indent);
        out.push_str(&pad);
        out.push('<');
        out.push_str(&element.tag_name);
        for (name, value) in &element.attributes {
            out.push_str(&format!(" {name}=\"{}\"", escape(&value_text(value))));
        }

        if element.children.is_empty() {
            out.push_str("/>\n");
            return;
        }

        let inline = element.children.iter().all(|node| match node {
            Node::Element(child) => substituted_value(child).is_some(),
            _ => true,
        });
        if inline {
            out.push('>');
            out.push_str(&inline_xml(&element.children, element.tag_name == "code"));
            out.push_str(&format!("</{}>\n", element.tag_name));
            return;
        }

        out.push_str(">\n");
        for node in &element.children {
            self.write_node(node, depth + 1, out);
        }
        out.push_str(&pad);
        out.push_str(&format!("</{}>\n", element.tag_name));
    }

    fn write_node(&self, node: &Node, depth: usize, out: &mut String) {
        let pad = " ".repeat(depth * self.indent);
        match node {
            Node::Element(element) => match substituted_value(element) {
                Some(value) => {
                    out.push_str(&pad);
                    out.push_str(&escape(&value_text(value)));
                    out.push('\n');
                }
                None => self.write_element(element, depth, out),
            },
            Node::Content(content) => {
                let text = collapse_whitespace(content_text(content));
                if !text.is_empty() {
                    out.push_str(&pad);
                    out.push_str(&escape(&text));
                    out.push('\n');
                }
            }
            Node::Reference(reference) => {
                out.push_str(&pad);
                out.push_str(&format!("<ref to=\"{}\"/>\n", escape(&reference.uri())));
            }
        }
    }
}

/// Text-level children on one line, inner whitespace squashed unless
/// `verbatim` is set.
fn inline_xml(nodes: &[Node], verbatim: bool) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Content(content) => out.push_str(&escape(content_text(content))),
            Node::Reference(reference) => {
                out.push_str(&format!("<ref to=\"{}\"/>", escape(&reference.uri())));
            }
            Node::Element(element) => {
                if let Some(value) = substituted_value(element) {
                    out.push_str(&escape(&value_text(value)));
                }
            }
        }
    }
    if verbatim {
        code_body(&out).to_string()
    } else {
        squash(&out)
    }
}

fn squash(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

impl OutputAdapter for XmlAdapter {
    fn format(&self) -> &str {
        "xml"
    }

    fn description(&self) -> &str {
        "Indented XML re-serialization"
    }

    fn render(&self, document: &ProcessedDocument, _context: &TransformContext) -> Result<RenderedOutput> {
        let mut out = String::new();
        if self.declaration {
            out.push_str(DECLARATION);
            out.push('\n');
        }
        for node in &document.document.children {
            self.write_node(node, 0, &mut out);
        }
        Ok(RenderedOutput::Text(out))
    }
}
