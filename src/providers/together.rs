//! Together.ai provider implementation
//!
//! Together exposes an OpenAI-compatible Chat Completions endpoint. Replies
//! are fetched in one round trip; streaming callers receive the whole reply
//! as a single fragment through the trait's default `open_stream`.

use crate::config::TogetherConfig;
use crate::error::{BotchatError, Result};
use crate::providers::base::{Message, Provider};
use crate::providers::openai::{
    build_client, completions_url, post_chat, read_completion, ChatCompletionRequest,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Registry id of this provider
pub const TOGETHER_ID: &str = "together";

/// Together.ai provider
pub struct TogetherProvider {
    client: Client,
    config: TogetherConfig,
    api_key: Option<String>,
}

impl TogetherProvider {
    /// Create a new Together provider, resolving the key from config or keyring
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: TogetherConfig) -> Result<Self> {
        let api_key = super::resolve_api_key(config.api_key.clone(), TOGETHER_ID);
        Self::with_api_key(config, api_key)
    }

    /// Create a provider with an explicit key, skipping keyring lookup
    pub fn with_api_key(config: TogetherConfig, api_key: Option<String>) -> Result<Self> {
        let client = build_client(config.timeout_seconds)?;

        tracing::info!(
            "Initialized Together provider: api_base={}, default_model={}",
            config.api_base,
            config.default_model
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
                BotchatError::MissingCredentials("TOGETHER_API_KEY is not set".to_string()).into()
            })
    }
}

#[async_trait]
impl Provider for TogetherProvider {
    fn id(&self) -> &str {
        TOGETHER_ID
    }

    fn display_name(&self) -> &str {
        "Together.ai"
    }

    fn credential_env(&self) -> &str {
        "TOGETHER_API_KEY"
    }

    async fn send_completion(&self, messages: &[Message], model: &str) -> Result<String> {
        let api_key = self.api_key()?;
        let model = if model.is_empty() {
            self.config.default_model.as_str()
        } else {
            model
        };
        let request = ChatCompletionRequest {
            model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };
        let url = completions_url(&self.config.api_base);
        let response = post_chat(
            &self.client,
            &url,
            api_key,
            &request,
            "Together.ai",
            Duration::from_secs(self.config.timeout_seconds),
        )
        .await?;
        read_completion("Together.ai", response).await
    }
}
