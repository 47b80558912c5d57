mod common;

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use botchat::providers::{Provider, TogetherProvider};

use common::{completion_body, together_config};

#[tokio::test]
async fn test_together_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer tg-test"))
        .and(body_partial_json(json!({
            "model": "Qwen/Qwen2.5-72B-Instruct-Turbo",
            "messages": [{ "role": "user", "content": "hello" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hi from Together")))
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        TogetherProvider::with_api_key(together_config(&server.uri()), Some("tg-test".into()))
            .unwrap();
    let text = provider
        .complete("hello", &[], "Qwen/Qwen2.5-72B-Instruct-Turbo")
        .await;
    assert_eq!(text, "Hi from Together");
}

#[tokio::test]
async fn test_together_streams_one_fragment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("whole reply")))
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        TogetherProvider::with_api_key(together_config(&server.uri()), Some("tg-test".into()))
            .unwrap();
    assert!(!provider.get_provider_capabilities().supports_streaming);

    let fragments: Vec<String> = provider
        .stream_complete("hello", &[], "meta-llama/Llama-3.3-70B-Instruct-Turbo")
        .await
        .collect()
        .await;
    assert_eq!(fragments, vec!["whole reply"]);
}

#[tokio::test]
async fn test_together_rate_limit_is_quota_annotation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let provider =
        TogetherProvider::with_api_key(together_config(&server.uri()), Some("tg-test".into()))
            .unwrap();
    let text = provider.complete("hello", &[], "deepseek-ai/DeepSeek-V3").await;
    assert!(text.starts_with("❌ **API Quota Exceeded**"));
    assert!(text.contains("Together.ai"));
}
