//! Test utilities for Botchat
//!
//! Scripted fakes for the provider and retrieval seams, plus small helpers
//! for temporary directories and error assertions.

use crate::chunker::ChunkRecord;
use crate::config::Config;
use crate::error::{BotchatError, Result};
use crate::providers::{FragmentStream, Message, Provider, ProviderCapabilities};
use crate::retrieval::{RetrievalClient, RetrievalHit, RetrievalQuery};
use async_trait::async_trait;
use futures::stream;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Assert that an error contains the expected message
pub fn assert_error_contains<T: std::fmt::Debug>(result: Result<T>, expected: &str) {
    match result {
        Ok(value) => panic!(
            "Expected error containing '{}' but got Ok({:?})",
            expected, value
        ),
        Err(e) => {
            let error_msg = format!("{:#}", e);
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Configuration that keeps everything in memory
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = crate::config::StorageBackend::Memory;
    config
}

/// One request observed by a [`ScriptedProvider`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub model: String,
    pub streamed: bool,
}

/// Provider whose behavior is fixed up front
pub struct ScriptedProvider {
    id: String,
    fragments: Vec<String>,
    streaming: bool,
    failure: Option<fn() -> BotchatError>,
    fail_mid_stream: bool,
    panics: bool,
    hangs: bool,
    endless: bool,
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    fn base(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fragments: Vec::new(),
            streaming: false,
            failure: None,
            fail_mid_stream: false,
            panics: false,
            hangs: false,
            endless: false,
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Non-streaming provider that always answers `text`
    pub fn replying(id: &str, text: &str) -> Self {
        Self {
            fragments: vec![text.to_string()],
            ..Self::base(id)
        }
    }

    /// Streaming provider that yields `fragments` in order
    pub fn streaming(id: &str, fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            streaming: true,
            ..Self::base(id)
        }
    }

    /// Provider whose every call fails before producing text
    pub fn failing(id: &str, failure: fn() -> BotchatError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::base(id)
        }
    }

    /// Streaming provider that yields `fragments` and then fails
    pub fn failing_mid_stream(id: &str, fragments: &[&str], failure: fn() -> BotchatError) -> Self {
        Self {
            failure: Some(failure),
            fail_mid_stream: true,
            ..Self::streaming(id, fragments)
        }
    }

    /// Provider that panics as soon as it is invoked
    pub fn panicking(id: &str) -> Self {
        Self {
            panics: true,
            ..Self::base(id)
        }
    }

    /// Streaming provider that never yields and never ends
    pub fn hanging(id: &str) -> Self {
        Self {
            hangs: true,
            streaming: true,
            ..Self::base(id)
        }
    }

    /// Streaming provider that repeats `fragment` forever
    pub fn endless(id: &str, fragment: &str) -> Self {
        Self {
            endless: true,
            ..Self::streaming(id, &[fragment])
        }
    }

    /// Provider that answers `text` only after the returned gate is notified
    pub fn gated(id: &str, text: &str) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let provider = Self {
            gate: Some(gate.clone()),
            ..Self::replying(id, text)
        };
        (provider, gate)
    }

    /// Every request seen so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, messages: &[Message], model: &str, streamed: bool) {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            messages: messages.to_vec(),
            model: model.to_string(),
            streamed,
        });
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Scripted"
    }

    fn credential_env(&self) -> &str {
        "SCRIPTED_API_KEY"
    }

    fn get_provider_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: self.streaming,
        }
    }

    async fn send_completion(&self, messages: &[Message], model: &str) -> Result<String> {
        self.record(messages, model, false);
        self.wait_for_gate().await;
        if self.panics {
            panic!("scripted provider panic");
        }
        if self.hangs {
            futures::future::pending::<()>().await;
        }
        if let Some(failure) = self.failure {
            return Err(failure().into());
        }
        Ok(self.fragments.concat())
    }

    async fn open_stream(&self, messages: &[Message], model: &str) -> Result<FragmentStream> {
        self.record(messages, model, true);
        self.wait_for_gate().await;
        if self.panics {
            panic!("scripted provider panic");
        }
        if self.hangs {
            return Ok(Box::pin(stream::pending()));
        }
        if self.endless {
            let fragment = self.fragments.concat();
            return Ok(Box::pin(stream::repeat_with(move || Ok(fragment.clone()))));
        }
        if let Some(failure) = self.failure {
            if !self.fail_mid_stream {
                return Err(failure().into());
            }
        }

        let mut items: Vec<Result<String>> = if self.streaming {
            self.fragments.iter().cloned().map(Ok).collect()
        } else {
            vec![Ok(self.fragments.concat())]
        };
        if let (Some(failure), true) = (self.failure, self.fail_mid_stream) {
            items.push(Err(failure().into()));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

#[derive(Debug, Default)]
struct RetrievalLog {
    queries: Vec<RetrievalQuery>,
    records: Vec<ChunkRecord>,
    deleted: Vec<String>,
}

/// Retrieval client that returns fixed hits and records every call
#[derive(Debug, Default)]
pub struct RecordingRetrieval {
    hits: Vec<RetrievalHit>,
    log: Mutex<RetrievalLog>,
}

impl RecordingRetrieval {
    pub fn with_hits(texts: Vec<&str>) -> Self {
        Self {
            hits: texts
                .into_iter()
                .enumerate()
                .map(|(i, text)| RetrievalHit {
                    text: text.to_string(),
                    score: 1.0 - i as f64 * 0.1,
                })
                .collect(),
            log: Mutex::default(),
        }
    }

    pub fn queries(&self) -> Vec<RetrievalQuery> {
        self.log.lock().expect("log lock").queries.clone()
    }

    pub fn records(&self) -> Vec<ChunkRecord> {
        self.log.lock().expect("log lock").records.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.log.lock().expect("log lock").deleted.clone()
    }
}

#[async_trait]
impl RetrievalClient for RecordingRetrieval {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RetrievalHit>> {
        self.log.lock().expect("log lock").queries.push(query.clone());
        Ok(self.hits.iter().take(query.top_k).cloned().collect())
    }

    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        self.log
            .lock()
            .expect("log lock")
            .records
            .extend_from_slice(records);
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.log
            .lock()
            .expect("log lock")
            .deleted
            .push(session_id.to_string());
        Ok(())
    }
}

/// Retrieval client whose every call fails with a network-style error
#[derive(Debug, Default)]
pub struct FailingRetrieval;

#[async_trait]
impl RetrievalClient for FailingRetrieval {
    async fn search(&self, _query: &RetrievalQuery) -> Result<Vec<RetrievalHit>> {
        Err(BotchatError::Retrieval("connection refused".to_string()).into())
    }

    async fn upsert(&self, _records: &[ChunkRecord]) -> Result<()> {
        Err(BotchatError::Retrieval("connection refused".to_string()).into())
    }

    async fn delete_session(&self, _session_id: &str) -> Result<()> {
        Err(BotchatError::Retrieval("connection refused".to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "test.txt", "content");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "content");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        assert_error_contains(Ok(()), "error");
    }

    #[test]
    fn test_test_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[tokio::test]
    async fn test_scripted_stream_records_calls() {
        let provider = ScriptedProvider::streaming("openai", &["a", "b"]);
        let out: Vec<String> = provider
            .stream_complete("hi", &[], "m")
            .await
            .collect()
            .await;
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].streamed);
        assert_eq!(calls[0].messages, vec![Message::user("hi")]);
    }
}
