use std::sync::Arc;
use std::time::Duration;

use promptdoc_engine::protocols::{FileProtocolHandler, HttpProtocolHandler, ProtocolHandler};
use promptdoc_engine::{
    xml, ProcessError, ProcessingContext, Processor, ProcessorConfig, Reference, ReferenceResolver,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_handler() -> HttpProtocolHandler {
    HttpProtocolHandler::new()
        .unwrap()
        .with_retry(3, Duration::from_millis(1))
}

/// Reference pointing at a path on the mock server.
fn remote(server: &MockServer, route: &str) -> Reference {
    let authority = server.uri().trim_start_matches("http://").to_string();
    Reference::new("http", format!("{authority}{route}"))
}

#[tokio::test]
async fn test_http_json_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/persona.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tagName": "role"})))
        .mount(&server)
        .await;

    let value = http_handler()
        .handle(&remote(&server, "/persona.json"), &ProcessingContext::new())
        .await
        .unwrap();
    assert_eq!(value, json!({"tagName": "role"}));
}

#[tokio::test]
async fn test_http_text_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain notes"))
        .mount(&server)
        .await;

    let value = http_handler()
        .handle(&remote(&server, "/notes.txt"), &ProcessingContext::new())
        .await
        .unwrap();
    assert_eq!(value, json!("plain notes"));
}

#[tokio::test]
async fn test_http_server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = http_handler()
        .handle(&remote(&server, "/flaky"), &ProcessingContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::RetriesExhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_http_client_error_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = http_handler()
        .handle(&remote(&server, "/missing"), &ProcessingContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Http(_)));
}

#[tokio::test]
async fn test_resolver_caches_remote_reference() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shared"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"v": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let mut resolver = ReferenceResolver::with_local_defaults();
    resolver.register(Arc::new(http_handler()));

    let reference = remote(&server, "/shared");
    let mut ctx = ProcessingContext::new();
    let first = resolver.resolve(&reference, &mut ctx).await.unwrap();
    let second = resolver.resolve(&reference, &mut ctx).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.value, json!({"v": 1}));
}

#[tokio::test]
async fn test_remote_base_for_inheritance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/base"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tagName": "role",
            "attributes": {"id": "remote", "expertise": "finance"},
            "children": [{"type": "content", "value": "Accountant"}]
        })))
        .mount(&server)
        .await;

    let authority = server.uri().trim_start_matches("http://").to_string();
    let markup = format!(
        r#"<prompt><role extends="http://{authority}/base"/><task>Audit</task></prompt>"#
    );

    let mut resolver = ReferenceResolver::with_local_defaults();
    resolver.register(Arc::new(http_handler()));
    let processor = Processor::new(ProcessorConfig::default().with_resolver(resolver));

    let processed = processor
        .process(xml::parse_document(&markup).unwrap())
        .await
        .unwrap();
    let role = processed
        .document
        .root_element()
        .unwrap()
        .child_elements()
        .next()
        .unwrap();
    assert_eq!(role.attribute_str("expertise"), Some("finance"));
    assert_eq!(role.attribute_str("id"), None);
    assert_eq!(role.text(), "Accountant");
}

#[tokio::test]
async fn test_file_references_resolve_next_to_document() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("facts.yaml"), "year: 2024\nsource: registry\n").unwrap();
    let main = dir.path().join("main.xml");

    let document =
        xml::parse_document(r#"<prompt><context>See <ref to="file:facts.yaml"/></context><task>x</task></prompt>"#)
            .unwrap();
    let processed = Processor::default()
        .process_with_path(document, &main)
        .await
        .unwrap();

    let context = processed
        .document
        .root_element()
        .unwrap()
        .child_elements()
        .next()
        .unwrap();
    match &context.children[1] {
        promptdoc_engine::Node::Reference(reference) => {
            assert_eq!(reference.resolved, Some(json!({"year": 2024, "source": "registry"})));
        }
        other => panic!("expected reference, got {other:?}"),
    }
}

#[tokio::test]
async fn test_file_root_override() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "from root").unwrap();

    let mut resolver = ReferenceResolver::with_local_defaults();
    resolver.register(Arc::new(FileProtocolHandler::with_root(dir.path())));

    let mut ctx = ProcessingContext::new();
    let resolved = resolver
        .resolve(&Reference::new("file", "a.txt"), &mut ctx)
        .await
        .unwrap();
    assert_eq!(resolved.value, json!("from root"));
}
