mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use botchat::config::Config;
use botchat::orchestrator::Orchestrator;
use botchat::providers::{OpenAiProvider, ProviderRegistry};
use botchat::server::{router, AppState, ServerSettings};

use common::{completion_body, openai_config, sse_body};

fn app(server: &MockServer) -> axum::Router {
    let mut registry = ProviderRegistry::new("openai", "gpt-4o-mini");
    registry.register(Arc::new(
        OpenAiProvider::with_api_key(openai_config(&server.uri()), Some("sk-test".into())).unwrap(),
    ));
    router(Arc::new(AppState {
        orchestrator: Orchestrator::new(Arc::new(registry)),
        retrieval: None,
        settings: ServerSettings::from_config(&Config::default()),
    }))
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_body(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_chat_round_trip_through_openai() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                { "role": "user", "content": "My name is Sam" },
                { "role": "assistant", "content": "Hi Sam" },
                { "role": "user", "content": "What is my name?" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Sam")))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server)
        .oneshot(post(
            "/api/chat",
            json!({
                "message": "What is my name?",
                "conversationHistory": [
                    { "sender": "user", "text": "My name is Sam" },
                    { "sender": "bot", "text": "Hi Sam" }
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
    assert_eq!(body["response"], "Sam");
}

#[tokio::test]
async fn test_chat_vendor_failure_is_annotated_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
        .mount(&server)
        .await;

    let response = app(&server)
        .oneshot(post("/api/chat", json!({ "message": "hi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
    assert!(body["response"]
        .as_str()
        .unwrap()
        .starts_with("❌ **API Quota Exceeded**"));
}

#[tokio::test]
async fn test_stream_frames_vendor_fragments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&["One", " two"])),
        )
        .mount(&server)
        .await;

    let response = app(&server)
        .oneshot(post("/api/chat/stream", json!({ "message": "count" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_body(response).await;
    let events: Vec<Value> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();
    assert_eq!(events.first().unwrap()["type"], "start");
    assert_eq!(events.last().unwrap()["type"], "done");
    let text: String = events
        .iter()
        .filter(|e| e["type"] == "chunk")
        .map(|e| e["content"].as_str().unwrap())
        .collect();
    assert_eq!(text, "One two");
    assert_eq!(
        events
            .iter()
            .filter(|e| e["type"] == "done" || e["type"] == "error")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_generate_title_cleans_vendor_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("Title: \"Planning a Weekend Trip to Lisbon Portugal Soon\"")),
        )
        .mount(&server)
        .await;

    let response = app(&server)
        .oneshot(post(
            "/api/chat/generate-title",
            json!({ "messages": [
                { "sender": "user", "text": "Help me plan a trip to Lisbon" },
                { "sender": "bot", "text": "Sure!" }
            ] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
    assert_eq!(body["title"], "Planning a Weekend Trip to Lisbon Portugal");
}

#[tokio::test]
async fn test_rag_and_upload_unavailable_without_retrieval() {
    let server = MockServer::start().await;
    for (uri, body) in [
        ("/api/rag-query", json!({ "message": "q", "sessionId": "s1" })),
        ("/api/upload", json!({ "fileName": "a.txt", "text": "hello" })),
    ] {
        let response = app(&server).oneshot(post(uri, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
