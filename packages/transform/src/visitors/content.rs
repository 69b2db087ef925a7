//! Inline formatting and entity decoding for content nodes.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use promptdoc_engine::Content;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};

use super::TransformVisitor;
use crate::context::TransformContext;
use crate::error::Result;

/// Context variable overriding [`ContentVisitor::with_inline_formatting`].
pub const PARSE_INLINE_FORMATTING_VARIABLE: &str = "parseInlineFormatting";

/// Context variable overriding [`ContentVisitor::with_entity_decoding`].
pub const DECODE_ENTITIES_VARIABLE: &str = "decodeEntities";

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static BOLD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(?P<text>[^*]+)\*\*").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ITALIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(?P<text>[^*]+)\*").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`(?P<text>[^`]+)`").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[(?P<text>[^\]]*)\]\((?P<url>[^)\s]+)(?:\s+"(?P<title>[^"]*)")?\)"#)
        .expect("valid regex")
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static IMAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!\[(?P<text>[^\]]*)\]\((?P<src>[^)\s]+)(?:\s+"(?P<title>[^"]*)")?\)"#)
        .expect("valid regex")
});

/// `&name;`, `&#NN;` and `&#xHH;`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ENTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,31});")
        .expect("valid regex")
});

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", "\u{a0}"),
    ("copy", "\u{a9}"),
    ("reg", "\u{ae}"),
    ("trade", "\u{2122}"),
    ("hellip", "\u{2026}"),
    ("mdash", "\u{2014}"),
    ("ndash", "\u{2013}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("ldquo", "\u{201c}"),
    ("rdquo", "\u{201d}"),
    ("bull", "\u{2022}"),
    ("middot", "\u{b7}"),
    ("deg", "\u{b0}"),
    ("times", "\u{d7}"),
    ("euro", "\u{20ac}"),
];

/// Where a span is recorded on the content node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum FormatTarget {
    /// `meta.formats`
    Formats,
    /// `meta.links`
    Links,
    /// `meta.images`
    Images,
}

/// A formatted run inside a content value. Offsets are byte offsets into
/// the raw value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatSpan {
    #[serde(rename = "type")]
    pub format_type: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// Extra fields such as `url`, `src` or `title`.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Recognises one inline format.
pub trait FormatHandler: Send + Sync {
    fn format_type(&self) -> &str;

    fn target(&self) -> FormatTarget {
        FormatTarget::Formats
    }

    fn scan(&self, text: &str) -> Vec<FormatSpan>;
}

/// Regex-driven format handler.
///
/// The `text` capture group becomes the span text; every other named group
/// that matched becomes a span field.
#[derive(Debug, Clone)]
pub struct PatternFormat {
    format_type: String,
    target: FormatTarget,
    pattern: Regex,
    not_preceded_by: Option<char>,
    not_followed_by: Option<char>,
}

impl PatternFormat {
    pub fn new(format_type: impl Into<String>, pattern: Regex) -> Self {
        Self {
            format_type: format_type.into(),
            target: FormatTarget::Formats,
            pattern,
            not_preceded_by: None,
            not_followed_by: None,
        }
    }

    pub fn with_target(mut self, target: FormatTarget) -> Self {
        self.target = target;
        self
    }

    pub fn not_preceded_by(mut self, c: char) -> Self {
        self.not_preceded_by = Some(c);
        self
    }

    pub fn not_followed_by(mut self, c: char) -> Self {
        self.not_followed_by = Some(c);
        self
    }

    fn rejects(&self, text: &str, start: usize, end: usize) -> bool {
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        (self.not_preceded_by.is_some() && before == self.not_preceded_by)
            || (self.not_followed_by.is_some() && after == self.not_followed_by)
    }

    fn span(&self, caps: &Captures<'_>) -> Option<FormatSpan> {
        let whole = caps.get(0)?;
        let text = caps.name("text").map_or(whole.as_str(), |m| m.as_str());

        let mut fields = Map::new();
        for name in self.pattern.capture_names().flatten() {
            if name == "text" {
                continue;
            }
            if let Some(m) = caps.name(name) {
                fields.insert(name.to_string(), Value::String(m.as_str().to_string()));
            }
        }

        Some(FormatSpan {
            format_type: self.format_type.clone(),
            text: text.to_string(),
            start: whole.start(),
            end: whole.end(),
            fields,
        })
    }
}

impl FormatHandler for PatternFormat {
    fn format_type(&self) -> &str {
        &self.format_type
    }

    fn target(&self) -> FormatTarget {
        self.target
    }

    fn scan(&self, text: &str) -> Vec<FormatSpan> {
        let mut spans = Vec::new();
        let mut at = 0;
        while at <= text.len() {
            let Some(caps) = self.pattern.captures_at(text, at) else {
                break;
            };
            let Some(whole) = caps.get(0) else {
                break;
            };
            if self.rejects(text, whole.start(), whole.end()) {
                // Retry just past the rejected start; a shorter match may follow
                at = next_boundary(text, whole.start());
                continue;
            }
            spans.extend(self.span(&caps));
            at = whole.end().max(next_boundary(text, whole.start()));
        }
        spans
    }
}

fn next_boundary(text: &str, index: usize) -> usize {
    text[index..]
        .chars()
        .next()
        .map_or(text.len() + 1, |c| index + c.len_utf8())
}

/// Bold, italic, inline code, link and image handlers.
pub fn default_format_handlers() -> Vec<Arc<dyn FormatHandler>> {
    vec![
        Arc::new(PatternFormat::new("bold", BOLD_PATTERN.clone())),
        Arc::new(
            PatternFormat::new("italic", ITALIC_PATTERN.clone())
                .not_preceded_by('*')
                .not_followed_by('*'),
        ),
        Arc::new(PatternFormat::new("code", CODE_PATTERN.clone())),
        Arc::new(
            PatternFormat::new("link", LINK_PATTERN.clone())
                .with_target(FormatTarget::Links)
                .not_preceded_by('!'),
        ),
        Arc::new(PatternFormat::new("image", IMAGE_PATTERN.clone()).with_target(FormatTarget::Images)),
    ]
}

/// Decode HTML entities. Returns `None` when nothing was decoded;
/// unknown entities are left as written.
pub fn decode_entities(text: &str) -> Option<String> {
    let mut decoded = 0usize;
    let result = ENTITY_PATTERN.replace_all(text, |caps: &Captures<'_>| {
        let raw = &caps[0];
        match decode_entity(&caps[1]) {
            Some(replacement) => {
                decoded += 1;
                replacement
            }
            None => raw.to_string(),
        }
    });
    (decoded > 0).then(|| result.into_owned())
}

fn decode_entity(body: &str) -> Option<String> {
    let code_point = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = body.strip_prefix('#') {
        dec.parse::<u32>().ok()?
    } else {
        return NAMED_ENTITIES
            .iter()
            .find(|(name, _)| *name == body)
            .map(|(_, value)| (*value).to_string());
    };
    char::from_u32(code_point).map(String::from)
}

/// Annotates content nodes with inline formats and decoded entities.
///
/// Content directly inside `<code>` is left alone.
#[derive(Clone)]
pub struct ContentVisitor {
    parse_inline_formatting: bool,
    decode_entities: bool,
    handlers: Vec<Arc<dyn FormatHandler>>,
}

impl Default for ContentVisitor {
    fn default() -> Self {
        Self {
            parse_inline_formatting: true,
            decode_entities: true,
            handlers: default_format_handlers(),
        }
    }
}

impl ContentVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inline_formatting(mut self, enabled: bool) -> Self {
        self.parse_inline_formatting = enabled;
        self
    }

    pub fn with_entity_decoding(mut self, enabled: bool) -> Self {
        self.decode_entities = enabled;
        self
    }

    pub fn with_format_handler(mut self, handler: impl FormatHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Spans found in `text`, grouped by target, each group ordered by start.
    pub fn scan(&self, text: &str) -> Vec<(FormatTarget, Vec<FormatSpan>)> {
        let mut groups: Vec<(FormatTarget, Vec<FormatSpan>)> = Vec::new();
        for handler in &self.handlers {
            let spans = handler.scan(text);
            if spans.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|(target, _)| *target == handler.target()) {
                Some((_, existing)) => existing.extend(spans),
                None => groups.push((handler.target(), spans)),
            }
        }
        for (_, spans) in &mut groups {
            spans.sort_by_key(|s| (s.start, s.end));
        }
        groups
    }
}

impl std::fmt::Debug for ContentVisitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentVisitor")
            .field("parse_inline_formatting", &self.parse_inline_formatting)
            .field("decode_entities", &self.decode_entities)
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.format_type()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[async_trait]
impl TransformVisitor for ContentVisitor {
    fn name(&self) -> &str {
        "content"
    }

    fn priority(&self) -> i32 {
        60
    }

    async fn visit_content(
        &self,
        content: &mut Content,
        context: &mut TransformContext,
    ) -> Result<()> {
        if context.parent() == Some("code") {
            return Ok(());
        }

        let parse = context
            .flag(PARSE_INLINE_FORMATTING_VARIABLE)
            .unwrap_or(self.parse_inline_formatting);
        let decode = context
            .flag(DECODE_ENTITIES_VARIABLE)
            .unwrap_or(self.decode_entities);

        if parse {
            for (target, spans) in self.scan(&content.value) {
                content
                    .meta
                    .insert(target.as_ref().to_string(), serde_json::to_value(spans)?);
            }
        }
        if decode {
            if let Some(decoded) = decode_entities(&content.value) {
                content
                    .meta
                    .insert("decodedValue".to_string(), Value::String(decoded));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn annotate(value: &str, context: &mut TransformContext) -> Content {
        let mut content = Content::new(value);
        ContentVisitor::new()
            .visit_content(&mut content, context)
            .await
            .unwrap();
        content
    }

    #[tokio::test]
    async fn test_bold_and_italic_are_distinguished() {
        let content = annotate("**bold** and *it*", &mut TransformContext::new()).await;
        assert_eq!(
            content.meta["formats"],
            json!([
                {"type": "bold", "text": "bold", "start": 0, "end": 8},
                {"type": "italic", "text": "it", "start": 13, "end": 17}
            ])
        );
    }

    #[tokio::test]
    async fn test_inline_code() {
        let content = annotate("run `cargo fmt` first", &mut TransformContext::new()).await;
        assert_eq!(content.meta["formats"][0]["type"], json!("code"));
        assert_eq!(content.meta["formats"][0]["text"], json!("cargo fmt"));
    }

    #[tokio::test]
    async fn test_links_and_images() {
        let content = annotate(
            r#"See [docs](https://example.com "Docs") and ![logo](logo.png)"#,
            &mut TransformContext::new(),
        )
        .await;

        assert_eq!(
            content.meta["links"],
            json!([{
                "type": "link", "text": "docs", "start": 4, "end": 38,
                "url": "https://example.com", "title": "Docs"
            }])
        );
        assert_eq!(content.meta["images"][0]["src"], json!("logo.png"));
        assert_eq!(content.meta["images"][0]["text"], json!("logo"));
        assert!(content.meta.get("formats").is_none());
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(
            decode_entities("a &lt;b&gt; &amp; &#65;&#x42; &unknown;").as_deref(),
            Some("a <b> & AB &unknown;")
        );
        assert_eq!(decode_entities("plain text"), None);
        assert_eq!(decode_entities("&bogus;"), None);
    }

    #[tokio::test]
    async fn test_decoded_value_recorded() {
        let content = annotate("Tom &amp; Jerry", &mut TransformContext::new()).await;
        assert_eq!(content.meta["decodedValue"], json!("Tom & Jerry"));
        assert_eq!(content.value, "Tom &amp; Jerry");
    }

    #[tokio::test]
    async fn test_context_overrides_configuration() {
        let mut ctx = TransformContext::new();
        ctx.set_variable(PARSE_INLINE_FORMATTING_VARIABLE, json!(false));
        ctx.set_variable(DECODE_ENTITIES_VARIABLE, json!(false));
        let content = annotate("**x** &amp;", &mut ctx).await;
        assert!(content.meta.is_empty());

        let mut ctx = TransformContext::new();
        ctx.set_variable(PARSE_INLINE_FORMATTING_VARIABLE, json!(true));
        let mut content = Content::new("**x**");
        ContentVisitor::new()
            .with_inline_formatting(false)
            .visit_content(&mut content, &mut ctx)
            .await
            .unwrap();
        assert_eq!(content.meta["formats"][0]["type"], json!("bold"));
    }

    #[tokio::test]
    async fn test_custom_format_handler() {
        #[allow(clippy::expect_used)]
        let mention = PatternFormat::new(
            "mention",
            Regex::new(r"@(?P<text>[a-z]+)").expect("valid regex"),
        );
        let visitor = ContentVisitor::new().with_format_handler(mention);
        assert_eq!(visitor.handler_count(), 6);

        let mut content = Content::new("ask @ada");
        visitor
            .visit_content(&mut content, &mut TransformContext::new())
            .await
            .unwrap();
        assert_eq!(content.meta["formats"][0]["text"], json!("ada"));
    }

    #[tokio::test]
    async fn test_code_content_untouched() {
        let mut ctx = TransformContext::new();
        ctx.push_parent("code");
        let content = annotate("let x = **y**; // &amp;", &mut ctx).await;
        assert!(content.meta.is_empty());
    }
}
