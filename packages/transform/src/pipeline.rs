//! Process-then-transform facade.

use std::path::Path;

use promptdoc_engine::xml::parse_document;
use promptdoc_engine::{Document, ProcessingContext, Processor, ProcessorConfig};

use crate::config::{TransformOptions, TransformerConfig};
use crate::error::Result;
use crate::transformer::{TransformOutcome, Transformer};

/// A [`Processor`] and a [`Transformer`] run back to back.
///
/// Template variables from the options reach both stages: the processor
/// records them on the processed document and the transformer resolves
/// `<var>` elements against them.
///
/// Unless the transformer was given its own known-tag set, the tags of the
/// processor's schema count as known during the transform.
pub struct Pipeline {
    processor: Processor,
    transformer: Transformer,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Processor::default(), Transformer::default())
    }
}

impl Pipeline {
    pub fn new(processor: Processor, transformer: Transformer) -> Self {
        let transformer = match &processor.config().schema {
            Some(schema) if !transformer.has_custom_known_tags() => transformer.with_schema(schema),
            _ => transformer,
        };
        Self {
            processor,
            transformer,
        }
    }

    /// Pipeline configured from `PROMPTDOC_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::Config` for invalid transform settings.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            Processor::new(ProcessorConfig::from_env()),
            Transformer::new(TransformerConfig::from_env()?),
        ))
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    /// Process and transform a document.
    ///
    /// # Errors
    ///
    /// Returns a processing abort as `TransformError::Process`, or any
    /// error of [`Transformer::transform`].
    pub async fn run(&self, document: Document, options: &TransformOptions) -> Result<TransformOutcome> {
        self.run_with_context(document, ProcessingContext::new(), options)
            .await
    }

    async fn run_with_context(
        &self,
        document: Document,
        context: ProcessingContext,
        options: &TransformOptions,
    ) -> Result<TransformOutcome> {
        let context = context.with_variables(options.variables.clone());
        let processed = self.processor.process_with_context(document, context).await?;
        tracing::debug!(
            warnings = processed.has_warnings(),
            semantics = processed.semantics.len(),
            "Processed document, transforming"
        );
        self.transformer.transform(processed, options).await
    }

    /// Import XML text, then process and transform it.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::InvalidMarkup` (wrapped) for malformed XML;
    /// otherwise see [`Pipeline::run`].
    pub async fn render_xml(&self, text: &str, options: &TransformOptions) -> Result<TransformOutcome> {
        let document = parse_document(text)?;
        self.run(document, options).await
    }

    /// Read, import, process and transform an XML file. Relative `file:`
    /// references resolve against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::Io` if the file cannot be read; otherwise
    /// see [`Pipeline::render_xml`].
    pub async fn render_xml_file(
        &self,
        path: impl AsRef<Path>,
        options: &TransformOptions,
    ) -> Result<TransformOutcome> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        tracing::debug!(path = %path.display(), bytes = text.len(), "Read document");
        let document = parse_document(&text)?;
        self.run_with_context(document, ProcessingContext::new().with_file_path(path), options)
            .await
    }

    /// Blocking variant of [`Pipeline::run`].
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run`]; also `TransformError::Io` if the runtime
    /// cannot be created.
    pub fn run_blocking(&self, document: Document, options: &TransformOptions) -> Result<TransformOutcome> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run(document, options))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("processor", &self.processor.visitor_names())
            .field("transformer", &self.transformer)
            .finish()
    }
}
