use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use promptdoc_engine::protocols::HttpProtocolHandler;
use promptdoc_engine::schema::TagDefinition;
use promptdoc_engine::{
    xml, Element, Node, Processor, ProcessorConfig, ReferenceResolver, TagRegistry,
};
use promptdoc_transform::visitors::SemanticTagVisitor;
use promptdoc_transform::{
    Pipeline, Result, ThresholdAction, TransformContext, TransformError, TransformOptions,
    TransformVisitor, Transformer, TransformerConfig,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REVIEW_PROMPT: &str = r#"<document mode="loose" lang="en">
  <prompt name="Review" description="Reviews a change">
    <role name="critic">Careful reader</role>
    <task>Review the diff for <var name="project"/></task>
    <constraint level="should">Keep it short</constraint>
    <constraint>Cite line numbers</constraint>
    <code lang="diff">- old
+ new</code>
  </prompt>
</document>"#;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

fn root(outcome: &promptdoc_transform::TransformOutcome) -> &Element {
    outcome.document.document.root_element().unwrap()
}

fn find<'a>(element: &'a Element, tag: &str) -> Option<&'a Element> {
    if element.tag_name == tag {
        return Some(element);
    }
    element.child_elements().find_map(|child| find(child, tag))
}

#[tokio::test]
async fn test_json_output() {
    init_tracing();
    let options = TransformOptions::new()
        .with_format("json")
        .with_variable("project", "promptdoc");
    let outcome = Pipeline::default()
        .render_xml(REVIEW_PROMPT, &options)
        .await
        .unwrap();

    assert!(!outcome.has_errors());
    let value = outcome.output.unwrap().as_value().cloned().unwrap();
    let prompt = &value["document"]["prompt"];

    assert_eq!(prompt["task"], json!("Review the diff for promptdoc"));
    assert_eq!(prompt["constraint"][0]["@attributes"]["level"], json!("should"));
    assert_eq!(prompt["constraint"][1]["@attributes"]["level"], json!("must"));
    assert_eq!(prompt["constraint"][1]["@text"], json!("Cite line numbers"));
    assert_eq!(prompt["code"]["@meta"]["language"], json!("diff"));
    assert_eq!(prompt["code"]["@meta"]["lineCount"], json!(2));
}

#[tokio::test]
async fn test_markdown_output() {
    let options = TransformOptions::new()
        .with_format("md")
        .with_variable("project", "promptdoc");
    let outcome = Pipeline::default()
        .render_xml(REVIEW_PROMPT, &options)
        .await
        .unwrap();
    let markdown = outcome.output.unwrap().to_string();

    assert!(markdown.starts_with("---\n"));
    assert!(markdown.contains("lang: en\n"));
    assert!(markdown.contains("mode: loose\n"));
    assert!(markdown.contains("# Review\n\nReviews a change\n\n## Role: critic\n\nCareful reader"));
    assert!(markdown.contains("## Task\n\nReview the diff for promptdoc"));
    assert!(markdown.contains("- **SHOULD**: Keep it short\n- **MUST**: Cite line numbers"));
    assert!(markdown.contains("```diff\n- old\n+ new\n```"));
}

#[tokio::test]
async fn test_xml_output_parses_back() {
    let options = TransformOptions::new()
        .with_format("xml")
        .with_variable("project", "promptdoc");
    let outcome = Pipeline::default()
        .render_xml(REVIEW_PROMPT, &options)
        .await
        .unwrap();
    let text = outcome.output.unwrap().to_string();
    assert!(text.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));

    let reparsed = xml::parse_document(&text).unwrap();
    let document = reparsed.root_element().unwrap();
    let task = find(document, "task").unwrap();
    assert_eq!(task.text(), "Review the diff for promptdoc");
    assert!(find(document, "var").is_none());
    assert_eq!(
        find(document, "constraint").unwrap().attribute_str("level"),
        Some("should")
    );
}

#[tokio::test]
async fn test_declared_output_format_is_used() {
    let outcome = Pipeline::default()
        .render_xml(
            r#"<prompt><task>Summarize</task><output-format format="markdown"/></prompt>"#,
            &TransformOptions::new(),
        )
        .await
        .unwrap();
    let markdown = outcome.output.unwrap().to_string();
    assert!(markdown.contains("## Task\n\nSummarize"));
    assert!(markdown.contains("## Output Format: markdown"));
}

#[tokio::test]
async fn test_configured_format_yields_to_variable_and_declaration() {
    let pipeline = Pipeline::new(
        Processor::default(),
        Transformer::new(TransformerConfig::loose().with_output_format("json")),
    );
    let markup = r#"<prompt><task>Summarize</task><output-format format="markdown"/></prompt>"#;

    let outcome = pipeline
        .render_xml(markup, &TransformOptions::new().with_variable("outputFormat", "xml"))
        .await
        .unwrap();
    assert!(outcome.output.unwrap().to_string().starts_with('<'));

    let outcome = pipeline.render_xml(markup, &TransformOptions::new()).await.unwrap();
    assert!(outcome.output.unwrap().to_string().contains("## Task\n\nSummarize"));

    let outcome = pipeline
        .render_xml("<prompt><task>Summarize</task></prompt>", &TransformOptions::new())
        .await
        .unwrap();
    assert!(outcome.output.unwrap().as_value().is_some());
}

#[tokio::test]
async fn test_processor_schema_defines_known_tags() {
    let mut schema = TagRegistry::new();
    schema.register("recipe", TagDefinition::new());
    schema.register("step", TagDefinition::new());
    let pipeline = Pipeline::new(
        Processor::new(ProcessorConfig::default().with_schema(schema)),
        Transformer::default(),
    );

    let outcome = pipeline
        .render_xml(
            "<recipe><step>Boil</step><garnish>Basil</garnish></recipe>",
            &TransformOptions::new().with_format("json"),
        )
        .await
        .unwrap();

    let recipe = root(&outcome);
    assert!(recipe.meta.get("isUnknown").is_none());
    assert!(find(recipe, "step").unwrap().meta.get("isUnknown").is_none());
    assert_eq!(find(recipe, "garnish").unwrap().meta["isUnknown"], json!(true));
}

#[tokio::test]
async fn test_missing_variable_recorded_in_loose_mode() {
    let outcome = Pipeline::default()
        .render_xml(REVIEW_PROMPT, &TransformOptions::new().with_format("json"))
        .await
        .unwrap();

    let var = find(root(&outcome), "var").unwrap();
    assert_eq!(var.meta["errors"][0]["code"], json!("MISSING_VARIABLE"));
    assert!(!outcome.aborted);
    assert!(outcome.output.is_some());
}

#[tokio::test]
async fn test_missing_variable_throws_in_strict_mode() {
    let transformer = Transformer::new(TransformerConfig::strict())
        .without_visitors()
        .with_visitor(SemanticTagVisitor::default().with_ignore_errors(false));
    let pipeline = Pipeline::new(Processor::default(), transformer);

    let err = pipeline
        .render_xml(REVIEW_PROMPT, &TransformOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::MissingVariable(ref name) if name == "project"));
}

#[tokio::test]
async fn test_content_annotations() {
    let outcome = Pipeline::default()
        .render_xml(
            r#"<prompt>
                 <task>Use **bold** and [docs](https://example.com) &amp;mdash; nothing else</task>
                 <code>**not bold**</code>
               </prompt>"#,
            &TransformOptions::new(),
        )
        .await
        .unwrap();

    let task = find(root(&outcome), "task").unwrap();
    let Node::Content(content) = &task.children[0] else {
        panic!("expected content");
    };
    assert_eq!(content.meta["formats"][0]["type"], json!("bold"));
    assert_eq!(content.meta["links"][0]["url"], json!("https://example.com"));
    assert!(content.meta["decodedValue"].as_str().unwrap().contains('\u{2014}'));

    let code = find(root(&outcome), "code").unwrap();
    let Node::Content(body) = &code.children[0] else {
        panic!("expected content");
    };
    assert!(body.meta.is_empty());
}

#[tokio::test]
async fn test_unknown_elements_are_marked() {
    let outcome = Pipeline::default()
        .render_xml(
            r#"<prompt><blink>Look here</blink><task>Go</task></prompt>"#,
            &TransformOptions::new().with_format("json"),
        )
        .await
        .unwrap();

    let blink = find(root(&outcome), "blink").unwrap();
    assert_eq!(blink.meta["isUnknown"], json!(true));
    assert_eq!(blink.meta["warning"], json!("Unknown element <blink>"));
}

/// Fails on every element it sees.
struct Brittle {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TransformVisitor for Brittle {
    fn name(&self) -> &str {
        "brittle"
    }

    async fn visit_element(&self, element: &mut Element, _context: &mut TransformContext) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransformError::Visitor {
            visitor: "brittle".to_string(),
            message: format!("cannot handle <{}>", element.tag_name),
        })
    }
}

async fn run_with_threshold(action: ThresholdAction) -> (promptdoc_transform::TransformOutcome, usize) {
    let calls = Arc::new(AtomicUsize::new(0));
    let transformer = Transformer::default().with_visitor(Brittle {
        calls: calls.clone(),
    });
    let pipeline = Pipeline::new(Processor::default(), transformer);
    let options = TransformOptions::new()
        .with_format("json")
        .with_error_threshold(3)
        .with_threshold_action(action);

    // prompt plus five tasks: six elements
    let outcome = pipeline
        .render_xml(
            "<prompt><task>a</task><task>b</task><task>c</task><task>d</task><task>e</task></prompt>",
            &options,
        )
        .await
        .unwrap();
    (outcome, calls.load(Ordering::SeqCst))
}

#[tokio::test]
async fn test_threshold_abort_stops_the_run() {
    init_tracing();
    let (outcome, calls) = run_with_threshold(ThresholdAction::AbortTransform).await;

    assert!(outcome.aborted);
    assert_eq!(calls, 4);
    assert_eq!(outcome.errors.len(), 4);
    assert!(outcome.output.is_none());
    assert_eq!(outcome.errors[0].code, "VISITOR_ERROR");
    assert_eq!(outcome.errors[0].message, "Visitor 'brittle' failed: cannot handle <prompt>");
}

#[tokio::test]
async fn test_threshold_disable_completes_the_run() {
    let (outcome, calls) = run_with_threshold(ThresholdAction::DisableVisitor).await;

    assert!(!outcome.aborted);
    assert_eq!(calls, 4);
    assert_eq!(outcome.errors.len(), 4);
    assert_eq!(outcome.disabled_visitors, vec!["brittle".to_string()]);
    let value = outcome.output.unwrap().as_value().cloned().unwrap();
    assert_eq!(value["prompt"]["task"], json!(["a", "b", "c", "d", "e"]));
}

#[tokio::test]
async fn test_deferred_http_reference_is_awaited() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/persona.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"title": "Persona", "href": "ignored"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut resolver = ReferenceResolver::with_local_defaults();
    resolver.register(Arc::new(
        HttpProtocolHandler::new()
            .unwrap()
            .with_retry(1, Duration::from_millis(1)),
    ));
    let processor = Processor::new(
        ProcessorConfig::default()
            .with_resolver(resolver)
            .with_deferred_protocols(&["http"]),
    );
    let pipeline = Pipeline::new(processor, Transformer::default());

    let markup = format!(
        r#"<prompt><context>See <ref to="{}/persona.json"/></context></prompt>"#,
        server.uri()
    );
    let outcome = pipeline
        .render_xml(&markup, &TransformOptions::new().with_format("json"))
        .await
        .unwrap();

    assert!(!outcome.has_errors());
    let value = outcome.output.unwrap().as_value().cloned().unwrap();
    let link = &value["prompt"]["context"]["@references"][0];
    assert_eq!(link["title"], json!("Persona"));
    assert_eq!(link["isRemote"], json!(true));
    assert_eq!(link["href"], json!(format!("{}/persona.json", server.uri())));
}

#[tokio::test]
async fn test_render_xml_file_resolves_relative_references() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("facts.txt"), "The sky is blue").unwrap();
    let main = dir.path().join("main.xml");
    std::fs::write(
        &main,
        r#"<prompt><context>Background: <ref to="file:facts.txt"/></context></prompt>"#,
    )
    .unwrap();

    let outcome = Pipeline::default()
        .render_xml_file(&main, &TransformOptions::new().with_format("markdown"))
        .await
        .unwrap();

    let markdown = outcome.output.as_ref().unwrap().to_string();
    assert!(markdown.contains("## Context\n\nBackground: facts.txt"));
    let context = find(root(&outcome), "context").unwrap();
    let Node::Reference(reference) = &context.children[1] else {
        panic!("expected reference");
    };
    assert_eq!(reference.resolved, Some(json!("The sky is blue")));
    assert_eq!(reference.meta["link"]["isFile"], json!(true));
}

#[tokio::test]
async fn test_render_xml_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = Pipeline::default()
        .render_xml_file(dir.path().join("absent.xml"), &TransformOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IO_ERROR");
}
