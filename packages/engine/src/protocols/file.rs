use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::ProtocolHandler;
use crate::ast::Reference;
use crate::config::MAX_DOCUMENT_SIZE;
use crate::context::ProcessingContext;
use crate::error::{ProcessError, Result};
use crate::xml;

/// Resolves `file:` references from the local filesystem.
///
/// Relative paths are resolved against, in order: the configured root, the
/// directory of the document being processed, the working directory.
/// The payload is parsed by extension: `.json`, `.yaml`/`.yml` and `.xml`
/// become structured values, anything else is returned as a string.
#[derive(Debug, Clone, Default)]
pub struct FileProtocolHandler {
    root: Option<PathBuf>,
}

impl FileProtocolHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve_path(&self, path: &str, context: &ProcessingContext) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        if let Some(root) = &self.root {
            return root.join(path);
        }
        match context.file_path().and_then(Path::parent) {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ProtocolHandler for FileProtocolHandler {
    fn name(&self) -> &str {
        "file"
    }

    fn can_handle(&self, protocol: &str) -> bool {
        protocol == "file"
    }

    async fn handle(&self, reference: &Reference, context: &ProcessingContext) -> Result<Value> {
        let path = self.resolve_path(&reference.path, context);
        tracing::debug!(path = %path.display(), "Reading file reference");

        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.len() > MAX_DOCUMENT_SIZE as u64 {
            return Err(ProcessError::InvalidMarkup(format!(
                "{} exceeds maximum document size ({} > {} bytes)",
                path.display(),
                metadata.len(),
                MAX_DOCUMENT_SIZE
            )));
        }
        let text = tokio::fs::read_to_string(&path).await?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(serde_json::from_str(&text)?),
            Some("yaml" | "yml") => Ok(serde_yaml_ng::from_str(&text)?),
            Some("xml") => Ok(serde_json::to_value(xml::parse_document(&text)?)?),
            _ => Ok(Value::String(text)),
        }
    }
}
