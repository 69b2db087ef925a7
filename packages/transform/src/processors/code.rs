use async_trait::async_trait;
use promptdoc_engine::Element;
use serde_json::{Map, Value};

use super::TransformProcessor;
use crate::context::TransformContext;
use crate::error::Result;

/// Language used when a code block declares none.
pub const DEFAULT_CODE_LANGUAGE: &str = "text";

/// Records `meta.language` and `meta.lineCount` for `<code>` blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeProcessor;

#[async_trait]
impl TransformProcessor for CodeProcessor {
    fn name(&self) -> &str {
        "code"
    }

    fn tag_name(&self) -> &str {
        "code"
    }

    async fn process(
        &self,
        element: &Element,
        _context: &mut TransformContext,
    ) -> Result<Map<String, Value>> {
        let language = element
            .attribute_str("lang")
            .map(|l| l.trim().to_ascii_lowercase())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_CODE_LANGUAGE.to_string());

        let text = element.text();
        let body = code_body(&text);
        let line_count = if body.is_empty() { 0 } else { body.lines().count() };

        let mut meta = Map::new();
        meta.insert("language".to_string(), Value::String(language));
        meta.insert("lineCount".to_string(), Value::from(line_count));
        Ok(meta)
    }
}

/// Code text without the blank lines around it.
pub(crate) fn code_body(text: &str) -> &str {
    text.trim_start_matches(['\n', '\r']).trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_language_and_lines() {
        let element = Element::new("code")
            .with_attribute("lang", "Rust")
            .with_text("\nfn main() {\n    println!(\"hi\");\n}\n");
        let meta = CodeProcessor
            .process(&element, &mut TransformContext::new())
            .await
            .unwrap();
        assert_eq!(meta["language"], json!("rust"));
        assert_eq!(meta["lineCount"], json!(3));
    }

    #[tokio::test]
    async fn test_defaults() {
        let meta = CodeProcessor
            .process(&Element::new("code"), &mut TransformContext::new())
            .await
            .unwrap();
        assert_eq!(meta["language"], json!(DEFAULT_CODE_LANGUAGE));
        assert_eq!(meta["lineCount"], json!(0));
    }
}
