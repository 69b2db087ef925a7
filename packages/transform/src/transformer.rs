//! Transform orchestrator
//!
//! Runs the transform visitors over a processed document and renders the
//! result with the selected output adapter.
//!
//! Visitor errors follow the configured policy:
//!
//! - `throw`: the first error is returned
//! - `warn`: the error is logged and recorded; once the number of errors
//!   exceeds the threshold, the threshold action either aborts the walk
//!   (no output is rendered) or disables the visitor that just failed

use std::sync::Arc;

use promptdoc_engine::schema::prompt_schema;
use promptdoc_engine::{BoxFuture, Node, ProcessedDocument, TagRegistry};
use serde::Serialize;

use crate::adapters::{AdapterFactory, AdapterSelector, RenderedOutput};
use crate::config::{ErrorHandling, ThresholdAction, TransformOptions, TransformerConfig};
use crate::context::TransformContext;
use crate::error::{Result, TransformError};
use crate::processors::{create_default_processors, TransformProcessor, TransformProcessorRegistry};
use crate::visitors::{
    ContentVisitor, ReferenceVisitor, SemanticTagVisitor, TransformVisitor, UnknownElementVisitor,
};

const UNKNOWN_ELEMENT_VISITOR: &str = "unknown-element";

/// A visitor error recovered during a loose run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformIssue {
    pub visitor: String,
    pub code: String,
    pub message: String,
}

/// Result of one transform call.
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    /// The document with transform annotations, partial when aborted.
    pub document: ProcessedDocument,
    /// `None` when the run aborted or no adapter matched.
    pub output: Option<RenderedOutput>,
    pub errors: Vec<TransformIssue>,
    pub aborted: bool,
    /// Visitors switched off by the `disable-visitor` action, in order.
    pub disabled_visitors: Vec<String>,
}

impl TransformOutcome {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Error bookkeeping for one run.
struct RunState {
    error_handling: ErrorHandling,
    error_threshold: usize,
    threshold_action: ThresholdAction,
    active: Vec<bool>,
    errors: Vec<TransformIssue>,
    disabled: Vec<String>,
    aborted: bool,
}

/// Transforms processed documents with a fixed configuration.
///
/// Holds only immutable configuration and may be shared between tasks.
pub struct Transformer {
    config: TransformerConfig,
    visitors: Vec<Arc<dyn TransformVisitor>>,
    adapters: Arc<AdapterFactory>,
    processors: TransformProcessorRegistry,
    /// Set once the known-tag set was chosen by the caller.
    custom_known_tags: bool,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new(TransformerConfig::default())
    }
}

impl Transformer {
    /// Transformer with the built-in visitors and adapters. Tags of the
    /// built-in prompt vocabulary count as known.
    pub fn new(config: TransformerConfig) -> Self {
        let processors = create_default_processors();
        let mut transformer = Self {
            config,
            visitors: Vec::new(),
            adapters: Arc::new(AdapterFactory::with_defaults()),
            processors: processors.clone(),
            custom_known_tags: false,
        };
        transformer.add_visitor(Arc::new(UnknownElementVisitor::for_schema(&prompt_schema())));
        transformer.add_visitor(Arc::new(SemanticTagVisitor::new(Arc::new(processors))));
        transformer.add_visitor(Arc::new(ContentVisitor::new()));
        transformer.add_visitor(Arc::new(ReferenceVisitor::new()));
        transformer
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    pub fn adapters(&self) -> &AdapterFactory {
        &self.adapters
    }

    /// Visitor names in execution order.
    pub fn visitor_names(&self) -> Vec<&str> {
        self.visitors.iter().map(|v| v.name()).collect()
    }

    pub fn with_visitor(mut self, visitor: impl TransformVisitor + 'static) -> Self {
        if visitor.name() == UNKNOWN_ELEMENT_VISITOR {
            self.custom_known_tags = true;
        }
        self.add_visitor(Arc::new(visitor));
        self
    }

    /// Drop all visitors registered so far, built-in ones included.
    pub fn without_visitors(mut self) -> Self {
        self.visitors.clear();
        self.custom_known_tags = true;
        self
    }

    /// Treat the tags of `schema` as the known vocabulary, replacing the
    /// unknown-element visitor.
    pub fn with_schema(mut self, schema: &TagRegistry) -> Self {
        self.replace_visitor(Arc::new(UnknownElementVisitor::for_schema(schema)));
        self.custom_known_tags = true;
        self
    }

    /// Register a transform-time processor next to the built-in ones.
    ///
    /// Rebuilds the semantic-tag visitor over the extended registry.
    pub fn with_processor(mut self, processor: impl TransformProcessor + 'static) -> Self {
        self.processors.register(processor);
        let registry = Arc::new(self.processors.clone());
        self.replace_visitor(Arc::new(SemanticTagVisitor::new(registry)));
        self
    }

    pub(crate) fn has_custom_known_tags(&self) -> bool {
        self.custom_known_tags
    }

    pub fn with_adapter_factory(mut self, adapters: Arc<AdapterFactory>) -> Self {
        self.adapters = adapters;
        self
    }

    fn replace_visitor(&mut self, visitor: Arc<dyn TransformVisitor>) {
        self.visitors.retain(|v| v.name() != visitor.name());
        self.add_visitor(visitor);
    }

    fn add_visitor(&mut self, visitor: Arc<dyn TransformVisitor>) {
        self.visitors.push(visitor);
        // Stable: equal priorities keep registration order
        self.visitors.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Transform a processed document and render it.
    ///
    /// # Errors
    ///
    /// In `throw` mode, the first visitor error. In any mode, a failure of
    /// the selected output adapter as `TransformError::Render`.
    pub async fn transform(
        &self,
        mut document: ProcessedDocument,
        options: &TransformOptions,
    ) -> Result<TransformOutcome> {
        let config = self.config.apply(options);
        let mut context = TransformContext::for_document(&document, options.variables.clone())
            .with_mode(config.mode);
        let mut state = RunState {
            error_handling: config.error_handling,
            error_threshold: config.error_threshold,
            threshold_action: config.threshold_action,
            active: vec![true; self.visitors.len()],
            errors: Vec::new(),
            disabled: Vec::new(),
            aborted: false,
        };

        tracing::debug!(
            mode = %config.mode,
            visitors = self.visitors.len(),
            threshold = config.error_threshold,
            "Transforming document"
        );
        self.walk(&mut document.document.children, &mut context, &mut state)
            .await?;

        let output = if state.aborted {
            tracing::warn!(errors = state.errors.len(), "Transform aborted, no output rendered");
            None
        } else {
            let selector = AdapterSelector::new(self.adapters.clone())
                .with_default_format(config.output_format.clone())
                .with_inference(config.infer_format)
                .with_strict_matching(config.strict_matching);
            match selector.select(options.format.as_deref(), &document, &context) {
                Some(adapter) => Some(adapter.render(&document, &context).map_err(|err| {
                    TransformError::Render {
                        format: adapter.format().to_string(),
                        message: err.to_string(),
                    }
                })?),
                None => None,
            }
        };

        tracing::debug!(
            errors = state.errors.len(),
            disabled = state.disabled.len(),
            rendered = output.is_some(),
            "Transform finished"
        );
        Ok(TransformOutcome {
            document,
            output,
            errors: state.errors,
            aborted: state.aborted,
            disabled_visitors: state.disabled,
        })
    }

    /// Blocking variant of [`Transformer::transform`].
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// See [`Transformer::transform`]; also `TransformError::Io` if the
    /// runtime cannot be created.
    pub fn transform_blocking(
        &self,
        document: ProcessedDocument,
        options: &TransformOptions,
    ) -> Result<TransformOutcome> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.transform(document, options))
    }

    /// One depth-first pass; every active visitor sees a node before its
    /// children are visited.
    fn walk<'a>(
        &'a self,
        nodes: &'a mut [Node],
        context: &'a mut TransformContext,
        state: &'a mut RunState,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for node in nodes.iter_mut() {
                for (index, visitor) in self.visitors.iter().enumerate() {
                    if state.aborted {
                        return Ok(());
                    }
                    if !state.active.get(index).copied().unwrap_or(false) {
                        continue;
                    }
                    let result = match node {
                        Node::Element(element) => visitor.visit_element(element, context).await,
                        Node::Content(content) => visitor.visit_content(content, context).await,
                        Node::Reference(reference) => {
                            visitor.visit_reference(reference, context).await
                        }
                    };
                    if let Err(err) = result {
                        handle_error(index, visitor.name(), err, state)?;
                    }
                }

                if let Node::Element(element) = node {
                    context.push_parent(&element.tag_name);
                    let result = self.walk(&mut element.children, context, state).await;
                    context.pop_parent();
                    result?;
                }
            }
            Ok(())
        })
    }
}

fn handle_error(
    index: usize,
    visitor: &str,
    err: TransformError,
    state: &mut RunState,
) -> Result<()> {
    if state.error_handling == ErrorHandling::Throw {
        tracing::error!(visitor, error = %err, "Transform visitor failed");
        return Err(err);
    }

    tracing::warn!(visitor, code = err.code(), error = %err, "Transform visitor failed");
    state.errors.push(TransformIssue {
        visitor: visitor.to_string(),
        code: err.code().to_string(),
        message: err.to_string(),
    });
    if state.errors.len() <= state.error_threshold {
        return Ok(());
    }

    match state.threshold_action {
        ThresholdAction::AbortTransform => {
            tracing::warn!(
                errors = state.errors.len(),
                threshold = state.error_threshold,
                "Error threshold exceeded, aborting transform"
            );
            state.aborted = true;
        }
        ThresholdAction::DisableVisitor => {
            if let Some(active) = state.active.get_mut(index) {
                if *active {
                    tracing::warn!(
                        visitor,
                        errors = state.errors.len(),
                        threshold = state.error_threshold,
                        "Error threshold exceeded, disabling visitor"
                    );
                    *active = false;
                    state.disabled.push(visitor.to_string());
                }
            }
        }
    }
    Ok(())
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("config", &self.config)
            .field("visitors", &self.visitor_names())
            .field("adapters", &self.adapters)
            .finish()
    }
}
