//! OpenAI provider implementation
//!
//! Talks to the Chat Completions API. Streaming responses arrive as
//! server-sent events whose `data:` payloads carry `choices[0].delta.content`
//! and end with `data: [DONE]`.
//!
//! The request/response shapes and the status mapping are shared with other
//! OpenAI-compatible vendors.

use crate::config::OpenAiConfig;
use crate::error::{BotchatError, Result};
use crate::providers::base::{FragmentStream, Message, Provider, ProviderCapabilities};
use crate::providers::sse::SseDecoder;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Registry id of this provider
pub const OPENAI_ID: &str = "openai";

/// Request body for `POST /chat/completions`
#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Build an HTTP client for a vendor
///
/// Only connection setup is bounded here. Whole-request deadlines are set
/// per request by [`post_chat`], and streamed bodies are bounded by the
/// orchestrator.
pub(crate) fn build_client(timeout_seconds: u64) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!("botchat/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BotchatError::Provider(format!("Failed to create HTTP client: {}", e)).into())
}

/// Map a transport failure to a classified error
pub(crate) fn transport_error(vendor: &str, e: reqwest::Error) -> BotchatError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        BotchatError::Network(format!("{} request failed: {}", vendor, e))
    } else {
        BotchatError::Provider(format!("{} request failed: {}", vendor, e))
    }
}

/// Map a non-success status to a classified error
pub(crate) async fn check_status(vendor: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!("{} returned error {}: {}", vendor, status, body);

    let err = match status.as_u16() {
        401 | 403 => BotchatError::Authentication(format!(
            "{} rejected the API key ({})",
            vendor, status
        )),
        402 | 429 => {
            BotchatError::QuotaExceeded(format!("{} returned {}: {}", vendor, status, body))
        }
        _ if body.contains("insufficient_quota") => {
            BotchatError::QuotaExceeded(format!("{} returned {}: {}", vendor, status, body))
        }
        _ => BotchatError::Provider(format!("{} returned error {}: {}", vendor, status, body)),
    };
    Err(err.into())
}

/// POST a chat request with bearer auth and check the status
///
/// `timeout` bounds non-streaming requests end to end. A streaming request
/// is never cut off here, so a slow but healthy reply keeps flowing.
pub(crate) async fn post_chat(
    client: &Client,
    url: &str,
    api_key: &str,
    request: &ChatCompletionRequest<'_>,
    vendor: &str,
    timeout: Duration,
) -> Result<Response> {
    tracing::debug!(
        "Sending {} request: model={}, {} messages, stream={}",
        vendor,
        request.model,
        request.messages.len(),
        request.stream
    );

    let mut builder = client.post(url).bearer_auth(api_key).json(request);
    if !request.stream {
        builder = builder.timeout(timeout);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| {
            tracing::error!("{} request failed: {}", vendor, e);
            transport_error(vendor, e)
        })?;

    check_status(vendor, response).await
}

/// Read the first choice's content from a non-streaming response
pub(crate) async fn read_completion(vendor: &str, response: Response) -> Result<String> {
    let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
        tracing::error!("Failed to parse {} response: {}", vendor, e);
        BotchatError::Provider(format!("Failed to parse {} response: {}", vendor, e))
    })?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| BotchatError::Provider(format!("{} returned no content", vendor)).into())
}

/// Join a base URL and the completions path
pub(crate) fn completions_url(api_base: &str) -> String {
    format!("{}/chat/completions", api_base.trim_end_matches('/'))
}

enum StreamStep {
    Fragment(String),
    Skip,
    Done,
    Failed(BotchatError),
}

fn interpret_event(vendor: &str, data: &str) -> StreamStep {
    let data = data.trim();
    if data.is_empty() {
        return StreamStep::Skip;
    }
    if data == "[DONE]" {
        return StreamStep::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return StreamStep::Failed(BotchatError::Provider(format!(
                    "{} stream error: {}",
                    vendor, error
                )));
            }
            match chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
            {
                Some(text) if !text.is_empty() => StreamStep::Fragment(text),
                _ => StreamStep::Skip,
            }
        }
        Err(e) => {
            tracing::warn!("Skipping malformed {} stream event: {}", vendor, e);
            StreamStep::Skip
        }
    }
}

/// Returns false once the stream should stop
async fn deliver(step: StreamStep, tx: &mpsc::Sender<Result<String>>) -> bool {
    match step {
        StreamStep::Fragment(text) => tx.send(Ok(text)).await.is_ok(),
        StreamStep::Skip => true,
        StreamStep::Done => false,
        StreamStep::Failed(err) => {
            let _ = tx.send(Err(err.into())).await;
            false
        }
    }
}

/// Decode an SSE body into fragments until `[DONE]`, an error, or the
/// consumer going away
pub(crate) async fn forward_sse_fragments(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    tx: mpsc::Sender<Result<String>>,
    vendor: String,
) {
    let mut decoder = SseDecoder::new();
    tokio::pin!(byte_stream);

    loop {
        let chunk = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("{} stream consumer dropped; releasing connection", vendor);
                return;
            }
            chunk = byte_stream.next() => chunk,
        };

        let bytes = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                let _ = tx.send(Err(transport_error(&vendor, e).into())).await;
                return;
            }
            None => break,
        };

        for event in decoder.push(&bytes) {
            if !deliver(interpret_event(&vendor, &event.data), &tx).await {
                return;
            }
        }
    }

    if let Some(event) = decoder.finish() {
        deliver(interpret_event(&vendor, &event.data), &tx).await;
    }
}

/// OpenAI provider
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
    api_key: Option<String>,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider
    ///
    /// The API key comes from the configuration (which already includes
    /// `OPENAI_API_KEY`) or, failing that, the OS keyring. A missing key is
    /// reported on the first call, not here.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let api_key = super::resolve_api_key(config.api_key.clone(), OPENAI_ID);
        Self::with_api_key(config, api_key)
    }

    /// Create a provider with an explicit key, skipping keyring lookup
    ///
    /// # Examples
    ///
    /// ```
    /// use botchat::config::OpenAiConfig;
    /// use botchat::providers::{OpenAiProvider, Provider};
    ///
    /// let provider = OpenAiProvider::with_api_key(OpenAiConfig::default(), None).unwrap();
    /// assert_eq!(provider.id(), "openai");
    /// ```
    pub fn with_api_key(config: OpenAiConfig, api_key: Option<String>) -> Result<Self> {
        let client = build_client(config.timeout_seconds)?;

        tracing::info!(
            "Initialized OpenAI provider: api_base={}, credentials={}",
            config.api_base,
            if api_key.is_some() { "present" } else { "missing" }
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                BotchatError::MissingCredentials("OPENAI_API_KEY is not set".to_string()).into()
            })
    }

    fn request<'a>(
        &self,
        messages: &'a [Message],
        model: &'a str,
        stream: bool,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream,
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn id(&self) -> &str {
        OPENAI_ID
    }

    fn display_name(&self) -> &str {
        "OpenAI"
    }

    fn credential_env(&self) -> &str {
        "OPENAI_API_KEY"
    }

    fn get_provider_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: true,
        }
    }

    async fn send_completion(&self, messages: &[Message], model: &str) -> Result<String> {
        let api_key = self.api_key()?;
        let request = self.request(messages, model, false);
        let url = completions_url(&self.config.api_base);
        let response = post_chat(
            &self.client,
            &url,
            api_key,
            &request,
            "OpenAI",
            Duration::from_secs(self.config.timeout_seconds),
        )
        .await?;
        read_completion("OpenAI", response).await
    }

    async fn open_stream(&self, messages: &[Message], model: &str) -> Result<FragmentStream> {
        let api_key = self.api_key()?;
        let request = self.request(messages, model, true);
        let url = completions_url(&self.config.api_base);
        let response = post_chat(
            &self.client,
            &url,
            api_key,
            &request,
            "OpenAI",
            Duration::from_secs(self.config.timeout_seconds),
        )
        .await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(forward_sse_fragments(
            response.bytes_stream(),
            tx,
            "OpenAI".to_string(),
        ));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
