//! Document processor
//!
//! Runs one document through the processing stage:
//!
//! ```text
//! Init -> Validate -> Visit -> Finalize -> Done
//!   \________\__________\________\______-> Failed
//! ```
//!
//! - **Init**: reads the document mode so that every later policy decision
//!   sees it
//! - **Validate**: checks the tree against the schema and fills in
//!   attribute defaults
//! - **Visit**: one depth-first pass per visitor, highest priority first
//! - **Finalize**: collects document metadata, semantics and issues
//!
//! Errors go through the [`ErrorHandler`]. Recovered errors are recorded
//! on the element that raised them and in the document metadata; anything
//! else aborts with an `Err`.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ast::{BoxFuture, Document, Element, Node, ProcessedDocument};
use crate::config::ProcessorConfig;
use crate::context::ProcessingContext;
use crate::error::{ProcessError, ProcessingError, Result, Severity};
use crate::error_handler::ErrorHandler;
use crate::registry::{append_issues, SEMANTIC_KEY};
use crate::schema::{TagRegistry, Validator};
use crate::visitors::{
    read_document_metadata, DocumentMetadataVisitor, InheritanceVisitor, NodeVisitor,
    ReferenceResolutionVisitor, TagProcessorVisitor, DOCUMENT_METADATA_KEYS,
};

/// Stages of a processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ProcessingState {
    Init,
    Validate,
    Visit,
    Finalize,
    Done,
    Failed,
}

/// Processes documents with a fixed configuration.
///
/// A processor holds only immutable configuration and may be shared
/// between tasks; every call to [`Processor::process`] gets its own
/// [`ProcessingContext`].
pub struct Processor {
    config: ProcessorConfig,
    error_handler: ErrorHandler,
    visitors: Vec<Arc<dyn NodeVisitor>>,
}

impl Processor {
    pub fn new(config: ProcessorConfig) -> Self {
        let mut visitors: Vec<Arc<dyn NodeVisitor>> = vec![
            Arc::new(DocumentMetadataVisitor),
            Arc::new(InheritanceVisitor::new(config.resolver.clone())),
            Arc::new(
                ReferenceResolutionVisitor::new(config.resolver.clone())
                    .with_deferred_protocols(&config.deferred_protocols),
            ),
            Arc::new(TagProcessorVisitor::new(config.tag_processors.clone())),
        ];
        visitors.extend(config.visitors.iter().cloned());
        // Stable: equal priorities keep registration order
        visitors.sort_by(|a, b| b.priority().cmp(&a.priority()));

        Self {
            error_handler: config.error_handler(),
            config,
            visitors,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Visitor names in execution order.
    pub fn visitor_names(&self) -> Vec<&str> {
        self.visitors.iter().map(|v| v.name()).collect()
    }

    /// Process a document.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the run: a validation failure, an
    /// unrecovered visitor error, or a fatal processing error.
    pub async fn process(&self, document: Document) -> Result<ProcessedDocument> {
        self.process_with_context(document, ProcessingContext::new())
            .await
    }

    /// Process a document read from `path`; relative `file:` references
    /// resolve against its directory.
    ///
    /// # Errors
    ///
    /// See [`Processor::process`].
    pub async fn process_with_path(
        &self,
        document: Document,
        path: impl Into<PathBuf>,
    ) -> Result<ProcessedDocument> {
        self.process_with_context(document, ProcessingContext::new().with_file_path(path))
            .await
    }

    /// Process a document with a caller-prepared context (e.g. carrying
    /// template variables).
    ///
    /// # Errors
    ///
    /// See [`Processor::process`].
    pub async fn process_with_context(
        &self,
        mut document: Document,
        mut context: ProcessingContext,
    ) -> Result<ProcessedDocument> {
        let mut state = ProcessingState::Init;
        let result = self.run(&mut document, &mut context, &mut state).await;

        match result {
            Ok(metadata) => {
                transition(&mut state, ProcessingState::Done);
                let semantics = collect_semantics(&document);
                let meta = transform_meta(&document, &context);
                Ok(ProcessedDocument {
                    document,
                    metadata,
                    semantics,
                    meta,
                })
            }
            Err(err) => {
                tracing::error!(stage = %state, error = %err, "Processing failed");
                transition(&mut state, ProcessingState::Failed);
                Err(err)
            }
        }
    }

    /// Blocking variant of [`Processor::process`].
    ///
    /// Drives the same future on a current-thread runtime. Must not be
    /// called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// See [`Processor::process`]; also `ProcessError::Io` if the runtime
    /// cannot be created.
    pub fn process_blocking(&self, document: Document) -> Result<ProcessedDocument> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.process(document))
    }

    async fn run(
        &self,
        document: &mut Document,
        context: &mut ProcessingContext,
        state: &mut ProcessingState,
    ) -> Result<Map<String, Value>> {
        // Init: the declared mode must be known before validation. An
        // invalid mode is reported once, by the metadata visitor.
        read_document_metadata(document, context).ok();

        transition(state, ProcessingState::Validate);
        let (validation_errors, validation_warnings) = match &self.config.schema {
            Some(schema) => self.validate(schema, document, context)?,
            None => (Vec::new(), Vec::new()),
        };

        transition(state, ProcessingState::Visit);
        for visitor in &self.visitors {
            tracing::debug!(visitor = visitor.name(), priority = visitor.priority(), "Running visitor");
            if let Err(err) = visitor.visit_document(document, context).await {
                self.recover(err, None, context)?;
            }
            self.walk(visitor.as_ref(), &mut document.children, context)
                .await?;
        }

        transition(state, ProcessingState::Finalize);
        let mut metadata = Map::new();
        metadata.insert(
            "mode".to_string(),
            Value::String(context.document_mode().to_string()),
        );
        for key in DOCUMENT_METADATA_KEYS.iter().filter(|k| **k != "mode") {
            if let Some(value) = context.document_metadata().get(*key) {
                metadata.insert(key.to_string(), value.clone());
            }
        }
        metadata.insert("validationErrors".to_string(), serde_json::to_value(validation_errors)?);
        metadata.insert(
            "validationWarnings".to_string(),
            serde_json::to_value(validation_warnings)?,
        );
        metadata.insert(
            "processingErrors".to_string(),
            serde_json::to_value(context.issues())?,
        );
        tracing::debug!(
            issues = context.issues().len(),
            cached_references = context.cached_reference_count(),
            "Processing finished"
        );
        Ok(metadata)
    }

    /// Validate and apply defaults.
    ///
    /// Recovered errors are reported in both lists so that a loose run
    /// always surfaces them as warnings.
    fn validate(
        &self,
        schema: &TagRegistry,
        document: &mut Document,
        context: &mut ProcessingContext,
    ) -> Result<(Vec<ProcessingError>, Vec<ProcessingError>)> {
        let result = Validator::new(schema).validate(document);
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for issue in &result.errors {
            let mut record = ProcessingError::error(&issue.message).with_code(&issue.code);
            record.position = issue.position;
            match self
                .error_handler
                .handle_with_context(record, None, context.declared_mode())
            {
                Ok(recorded) => {
                    errors.push(recorded.clone());
                    warnings.push(recorded.escalate(Severity::Warning));
                }
                Err(_) => {
                    return Err(ProcessError::Validation {
                        issues: result.errors.clone(),
                    })
                }
            }
        }
        for issue in &result.warnings {
            let mut record = ProcessingError::warning(&issue.message).with_code(&issue.code);
            record.position = issue.position;
            warnings.push(self.error_handler.handle(record)?);
        }

        apply_defaults(schema, &mut document.children);
        Ok((errors, warnings))
    }

    fn walk<'a>(
        &'a self,
        visitor: &'a dyn NodeVisitor,
        nodes: &'a mut [Node],
        context: &'a mut ProcessingContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for node in nodes.iter_mut() {
                match node {
                    Node::Element(element) => {
                        if let Err(err) = visitor.visit_element(element, context).await {
                            self.recover(err, Some(&mut *element), context)?;
                        }
                        context.push_parent(element);
                        let result = self.walk(visitor, &mut element.children, context).await;
                        context.pop_parent();
                        result?;
                    }
                    Node::Content(content) => {
                        if let Err(err) = visitor.visit_content(content, context).await {
                            self.recover(err, None, context)?;
                        }
                    }
                    Node::Reference(reference) => {
                        if let Err(err) = visitor.visit_reference(reference, context).await {
                            self.recover(err, None, context)?;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Pass an error through the handler. Recovered errors are recorded;
    /// otherwise the original error is returned.
    fn recover(
        &self,
        err: ProcessError,
        element: Option<&mut Element>,
        context: &mut ProcessingContext,
    ) -> Result<()> {
        let record = err.to_processing_error();
        let handled = self.error_handler.handle_with_context(
            record,
            element.as_deref(),
            context.declared_mode(),
        );

        match handled {
            Ok(recorded) => {
                if let Some(element) = element {
                    let key = if recorded.severity == Severity::Warning {
                        "warnings"
                    } else {
                        "errors"
                    };
                    append_issues(element, key, vec![recorded.clone()])?;
                }
                context.record_issue(recorded);
                Ok(())
            }
            // Keep typed errors typed; severity-graded ones carry the escalation
            Err(escalated) => match err {
                ProcessError::Processing(_) => Err(escalated),
                other => Err(other),
            },
        }
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(ProcessorConfig::default())
    }
}

fn transition(state: &mut ProcessingState, next: ProcessingState) {
    tracing::trace!(from = %state, to = %next, "Processing state");
    *state = next;
}

fn apply_defaults(schema: &TagRegistry, nodes: &mut [Node]) {
    for node in nodes {
        if let Node::Element(element) = node {
            schema.apply_defaults(element);
            apply_defaults(schema, &mut element.children);
        }
    }
}

/// Semantic results keyed by id, or `tag#n` (1-based, per tag) without one.
fn collect_semantics(document: &Document) -> Map<String, Value> {
    let mut semantics = Map::new();
    let mut counters: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();

    for element in document.elements() {
        let Some(semantic) = element.metadata.get(SEMANTIC_KEY) else {
            continue;
        };
        let key = match element.id() {
            Some(id) => id.to_string(),
            None => {
                let n = counters.entry(element.tag_name.as_str()).or_insert(0);
                *n += 1;
                format!("{}#{}", element.tag_name, n)
            }
        };
        semantics.entry(key).or_insert_with(|| semantic.clone());
    }
    semantics
}

/// Annotations handed to the transform stage: the context variables and
/// the first declared output format.
fn transform_meta(document: &Document, context: &ProcessingContext) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert(
        "variables".to_string(),
        Value::Object(context.variables.clone()),
    );
    let format = document
        .elements()
        .into_iter()
        .find(|e| e.tag_name == "output-format")
        .and_then(|e| e.attribute_str("format"));
    if let Some(format) = format {
        meta.insert("format".to_string(), Value::String(format.to_string()));
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DocumentMode;
    use serde_json::json;

    #[test]
    fn test_visitor_order() {
        let processor = Processor::default();
        assert_eq!(
            processor.visitor_names(),
            vec!["document-metadata", "inheritance", "reference-resolution", "tag-processor"]
        );
    }

    #[test]
    fn test_process_blocking() {
        let doc = Document::new(vec![Element::new("prompt")
            .with_child(Element::new("task").with_attribute("id", "t").with_text("Summarize"))
            .with_child(Element::new("constraint").with_text("Short"))
            .into()]);
        let processed = Processor::default().process_blocking(doc).unwrap();

        assert_eq!(processed.metadata["mode"], json!(DocumentMode::Loose.to_string()));
        assert_eq!(processed.semantics["t"]["instruction"], json!("Summarize"));
        assert_eq!(processed.semantics["constraint#1"]["level"], json!("must"));
        assert_eq!(processed.semantics["prompt#1"]["type"], json!("prompt"));
        assert!(!processed.has_warnings());
    }

    #[test]
    fn test_defaults_applied() {
        let doc = Document::new(vec![Element::new("constraint").with_text("x").into()]);
        let processed = Processor::default().process_blocking(doc).unwrap();
        let constraint = processed.document.root_element().unwrap();
        assert_eq!(constraint.attribute_str("level"), Some("must"));
    }

    #[test]
    fn test_transform_meta_format() {
        let doc = Document::new(vec![Element::new("prompt")
            .with_child(Element::new("task").with_text("x"))
            .with_child(Element::new("output-format").with_attribute("format", "markdown"))
            .into()]);
        let processed = Processor::default().process_blocking(doc).unwrap();
        assert_eq!(processed.meta["format"], json!("markdown"));
        assert!(processed.meta["variables"].is_object());
    }
}
