//! Response orchestration
//!
//! Resolves a model identifier to one registered provider and drives either
//! a single round trip or a streamed reply. Streamed replies are framed as
//! [`StreamEvent`]s: one `start`, any number of `chunk`s, then exactly one
//! terminal `done` or `error`.

use crate::error::{Result, ERROR_MARKER};
use crate::providers::{Message, ProviderRegistry, ResolvedModel};
use crate::storage::ChatMessage;
use crate::title::{build_title_prompt, clean_title, title_context};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One event of a streamed reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Start,
    Chunk { content: String },
    Done,
    Error { error: String },
}

impl StreamEvent {
    /// Whether this event ends the sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }
}

/// Lazy sequence of stream events
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Default upper bound on one streamed reply
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Routes requests to providers
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    stream_timeout: Duration,
}

impl Orchestrator {
    /// Create an orchestrator over a provider registry
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }

    /// Bound the total duration of a streamed reply
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolve a model identifier, falling back to the defaults
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no default provider is registered
    pub fn resolve(&self, model_id: Option<&str>) -> Result<ResolvedModel> {
        self.registry.resolve(model_id)
    }

    /// Single round trip; failures come back as annotated text
    ///
    /// # Arguments
    ///
    /// * `prompt` - Text of the new user turn, possibly augmented
    /// * `history` - Prior turns, oldest first
    /// * `model_id` - Requested model; `None` or unknown uses the default
    pub async fn respond(&self, prompt: &str, history: &[Message], model_id: Option<&str>) -> String {
        match self.resolve(model_id) {
            Ok(resolved) => {
                tracing::debug!(
                    "Responding with {}:{}",
                    resolved.provider.id(),
                    resolved.model
                );
                resolved
                    .provider
                    .complete(prompt, history, &resolved.model)
                    .await
            }
            Err(e) => {
                tracing::error!("Model resolution failed: {:#}", e);
                format!("{} **Error**: {}", ERROR_MARKER, e)
            }
        }
    }

    /// Streamed reply as a framed event sequence
    ///
    /// The producer runs on its own task. Dropping the returned stream stops
    /// the producer and releases the provider's connection.
    pub fn respond_streaming(
        &self,
        prompt: String,
        history: Vec<Message>,
        model_id: Option<String>,
    ) -> EventStream {
        let (tx, rx) = mpsc::channel(64);
        let registry = self.registry.clone();
        let timeout = self.stream_timeout;

        tokio::spawn(async move {
            if tx.send(StreamEvent::Start).await.is_err() {
                return;
            }

            let resolved = match registry.resolve(model_id.as_deref()) {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::error!("Model resolution failed: {:#}", e);
                    let _ = tx
                        .send(StreamEvent::Error {
                            error: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            let mut pump = tokio::spawn(pump_fragments(resolved, prompt, history, tx.clone()));
            let terminal = match tokio::time::timeout(timeout, &mut pump).await {
                Ok(Ok(true)) => StreamEvent::Done,
                Ok(Ok(false)) => return,
                Ok(Err(join_error)) => {
                    tracing::error!("Stream producer failed: {}", join_error);
                    StreamEvent::Error {
                        error: "The response stream failed unexpectedly".to_string(),
                    }
                }
                Err(_) => {
                    pump.abort();
                    // no chunk may follow the terminal event
                    let _ = pump.await;
                    tracing::warn!("Stream exceeded {:?}; aborting", timeout);
                    StreamEvent::Error {
                        error: format!("Response timed out after {} seconds", timeout.as_secs()),
                    }
                }
            };
            let _ = tx.send(terminal).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }

    /// Generate a short title from the first messages of a session
    ///
    /// Unlike [`respond`](Self::respond), vendor failures are returned as
    /// errors so they never end up as a title.
    ///
    /// # Errors
    ///
    /// Returns the vendor error, or a validation error if the reply is empty
    pub async fn generate_title(
        &self,
        messages: &[ChatMessage],
        model_id: Option<&str>,
        context_messages: usize,
    ) -> Result<String> {
        let resolved = self.resolve(model_id)?;
        let prompt = build_title_prompt(&title_context(messages, context_messages));
        let raw = resolved
            .provider
            .send_completion(&[Message::user(prompt)], &resolved.model)
            .await?;
        clean_title(&raw)
    }
}

/// Forward provider fragments as chunk events
///
/// Returns false when the consumer went away.
async fn pump_fragments(
    resolved: ResolvedModel,
    prompt: String,
    history: Vec<Message>,
    tx: mpsc::Sender<StreamEvent>,
) -> bool {
    let mut fragments = resolved
        .provider
        .stream_complete(&prompt, &history, &resolved.model)
        .await;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => None,
            next = fragments.next() => Some(next),
        };
        let content = match next {
            Some(Some(content)) => content,
            Some(None) => return true,
            None => {
                tracing::debug!("Stream consumer dropped; stopping producer");
                return false;
            }
        };
        if tx.send(StreamEvent::Chunk { content }).await.is_err() {
            tracing::debug!("Stream consumer dropped; stopping producer");
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotchatError;
    use crate::test_utils::ScriptedProvider;

    fn orchestrator(provider: ScriptedProvider) -> Orchestrator {
        let mut registry = ProviderRegistry::new("openai", "gpt-4o-mini");
        registry.register(Arc::new(provider));
        Orchestrator::new(Arc::new(registry))
    }

    async fn collect(stream: EventStream) -> Vec<StreamEvent> {
        stream.collect().await
    }

    fn assert_single_terminal(events: &[StreamEvent]) {
        assert_eq!(events.first(), Some(&StreamEvent::Start));
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1, "{:?}", events);
        assert!(events.last().map(StreamEvent::is_terminal).unwrap_or(false));
    }

    #[test]
    fn test_event_serialization() {
        let chunk = serde_json::to_string(&StreamEvent::Chunk {
            content: "Hi".into(),
        })
        .unwrap();
        assert_eq!(chunk, r#"{"type":"chunk","content":"Hi"}"#);
        assert_eq!(
            serde_json::to_string(&StreamEvent::Start).unwrap(),
            r#"{"type":"start"}"#
        );
        assert_eq!(
            serde_json::to_string(&StreamEvent::Error { error: "x".into() }).unwrap(),
            r#"{"type":"error","error":"x"}"#
        );
    }

    #[tokio::test]
    async fn test_respond_returns_provider_text() {
        let orch = orchestrator(ScriptedProvider::replying("openai", "Hello there"));
        assert_eq!(orch.respond("hi", &[], None).await, "Hello there");
    }

    #[tokio::test]
    async fn test_respond_failure_is_annotated_text() {
        let orch = orchestrator(ScriptedProvider::failing("openai", || {
            BotchatError::QuotaExceeded("429".into())
        }));
        let text = orch.respond("hi", &[], Some("gpt-4o-mini")).await;
        assert!(text.starts_with("❌ **API Quota Exceeded**"), "{}", text);
    }

    #[tokio::test]
    async fn test_streaming_emits_chunks_then_done() {
        let orch = orchestrator(ScriptedProvider::streaming("openai", &["Hel", "lo"]));
        let events = collect(orch.respond_streaming("hi".into(), vec![], None)).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Start,
                StreamEvent::Chunk {
                    content: "Hel".into()
                },
                StreamEvent::Chunk {
                    content: "lo".into()
                },
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_streaming_single_fragment_for_non_streaming_provider() {
        let orch = orchestrator(ScriptedProvider::replying("openai", "whole reply"));
        let events = collect(orch.respond_streaming("hi".into(), vec![], None)).await;
        assert_single_terminal(&events);
        assert_eq!(
            events[1],
            StreamEvent::Chunk {
                content: "whole reply".into()
            }
        );
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_streaming_failure_after_fragments_has_one_terminal() {
        let orch = orchestrator(ScriptedProvider::failing_mid_stream(
            "openai",
            &["a", "b"],
            || BotchatError::Network("reset".into()),
        ));
        let events = collect(orch.respond_streaming("hi".into(), vec![], None)).await;
        assert_single_terminal(&events);
        assert!(matches!(
            &events[3],
            StreamEvent::Chunk { content } if content.starts_with("❌ **Network Error**")
        ));
    }

    #[tokio::test]
    async fn test_streaming_immediate_failure_has_one_terminal() {
        let orch = orchestrator(ScriptedProvider::failing("openai", || {
            BotchatError::MissingCredentials("no key".into())
        }));
        let events = collect(orch.respond_streaming("hi".into(), vec![], None)).await;
        assert_single_terminal(&events);
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_streaming_panic_becomes_error_event() {
        let orch = orchestrator(ScriptedProvider::panicking("openai"));
        let events = collect(orch.respond_streaming("hi".into(), vec![], None)).await;
        assert_eq!(events.len(), 2);
        assert_single_terminal(&events);
        assert!(matches!(events[1], StreamEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_streaming_without_default_provider_is_start_then_error() {
        let orch = Orchestrator::new(Arc::new(ProviderRegistry::new("openai", "gpt-4o-mini")));
        let events = collect(orch.respond_streaming("hi".into(), vec![], None)).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StreamEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_streaming_timeout_becomes_error_event() {
        let orch = orchestrator(ScriptedProvider::hanging("openai"))
            .with_stream_timeout(Duration::from_millis(50));
        let events = collect(orch.respond_streaming("hi".into(), vec![], None)).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            StreamEvent::Error { error } if error.contains("timed out")
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_streaming_timeout_is_last_even_while_chunks_flow() {
        let orch = orchestrator(ScriptedProvider::endless("openai", "x"))
            .with_stream_timeout(Duration::from_millis(30));
        let events = collect(orch.respond_streaming("hi".into(), vec![], None)).await;
        assert_single_terminal(&events);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Error { error }) if error.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn test_unknown_model_falls_back_without_error() {
        let provider = Arc::new(ScriptedProvider::replying("openai", "fallback reply"));
        let mut registry = ProviderRegistry::new("openai", "gpt-4o-mini");
        registry.register(provider.clone());
        let orch = Orchestrator::new(Arc::new(registry));

        let text = orch.respond("hello", &[], Some("vendor-x/unknown")).await;
        assert_eq!(text, "fallback reply");
        assert_eq!(provider.calls()[0].model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_generate_title_cleans_reply() {
        let orch = orchestrator(ScriptedProvider::replying("openai", "\"Baking Sourdough Bread\""));
        let messages = vec![
            ChatMessage::user("How do I bake sourdough?"),
            ChatMessage::bot("Start with a starter."),
            ChatMessage::user("How long to proof?"),
        ];
        let title = orch.generate_title(&messages, None, 3).await.unwrap();
        assert_eq!(title, "Baking Sourdough Bread");
    }

    #[tokio::test]
    async fn test_generate_title_propagates_failure() {
        let orch = orchestrator(ScriptedProvider::failing("openai", || {
            BotchatError::Network("down".into())
        }));
        let messages = vec![ChatMessage::user("hi")];
        assert!(orch.generate_title(&messages, None, 3).await.is_err());
    }
}
