use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use botchat::config::{OpenAiConfig, RetrievalConfig, TogetherConfig};

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("botchat.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn openai_config(api_base: &str) -> OpenAiConfig {
    OpenAiConfig {
        api_base: api_base.to_string(),
        timeout_seconds: 5,
        ..OpenAiConfig::default()
    }
}

#[allow(dead_code)]
pub fn together_config(api_base: &str) -> TogetherConfig {
    TogetherConfig {
        api_base: api_base.to_string(),
        timeout_seconds: 5,
        ..TogetherConfig::default()
    }
}

#[allow(dead_code)]
pub fn retrieval_config(host: &str) -> RetrievalConfig {
    RetrievalConfig {
        enabled: true,
        host: Some(host.to_string()),
        api_key: Some("pc-test".to_string()),
        timeout_seconds: 5,
        ..RetrievalConfig::default()
    }
}

/// SSE body as OpenAI sends it: one `data:` frame per fragment, then `[DONE]`
#[allow(dead_code)]
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let chunk = serde_json::json!({
            "choices": [{ "delta": { "content": fragment } }]
        });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// Non-streaming chat completion body
#[allow(dead_code)]
pub fn completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
}
