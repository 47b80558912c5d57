//! Base provider trait and common types for Botchat
//!
//! This module defines the Provider trait that every LLM vendor adapter
//! implements, along with the single internal message representation that
//! adapters map to their vendor's wire format.

use crate::error::{ErrorCategory, Result};
use crate::storage::{ChatMessage, Sender};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Message structure for conversation
///
/// Represents a message in the conversation with the AI provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use botchat::providers::Message;
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    ///
    /// # Examples
    ///
    /// ```
    /// use botchat::providers::Message;
    ///
    /// let msg = Message::assistant("Hello, user!");
    /// assert_eq!(msg.role, "assistant");
    /// ```
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for Message {
    fn from(message: &ChatMessage) -> Self {
        match message.sender {
            Sender::User => Message::user(message.text.clone()),
            Sender::Bot => Message::assistant(message.text.clone()),
        }
    }
}

/// Convert a session log to provider messages, preserving order and role
pub fn history_to_messages(history: &[ChatMessage]) -> Vec<Message> {
    history.iter().map(Message::from).collect()
}

/// Build the full request: prior turns followed by the prompt as a user message
pub fn build_request_messages(prompt: &str, history: &[Message]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.extend(history.iter().cloned());
    messages.push(Message::user(prompt));
    messages
}

/// Fallible stream of text fragments straight from a vendor
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Infallible stream of text fragments; failures arrive as a final fragment
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Provider capability flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Provider streams responses incrementally
    pub supports_streaming: bool,
}

/// Provider trait for LLM vendors
///
/// Implementors supply the two fallible vendor calls
/// ([`send_completion`](Provider::send_completion) and optionally
/// [`open_stream`](Provider::open_stream)); the provided
/// [`complete`](Provider::complete) and
/// [`stream_complete`](Provider::stream_complete) methods turn every failure
/// into annotated text so callers never see an error from a turn.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used by the registry (e.g. `openai`)
    fn id(&self) -> &str;

    /// Human readable vendor name used in error annotations
    fn display_name(&self) -> &str;

    /// Environment variable that carries this vendor's API key
    fn credential_env(&self) -> &str;

    /// Get provider capabilities
    fn get_provider_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    /// Single round trip to the vendor
    ///
    /// # Arguments
    ///
    /// * `messages` - Full request, prior turns first and prompt last
    /// * `model` - Vendor model identifier
    ///
    /// # Errors
    ///
    /// Returns a classified `BotchatError` on credential, quota, network, or
    /// response failures
    async fn send_completion(&self, messages: &[Message], model: &str) -> Result<String>;

    /// Open an incremental response
    ///
    /// The default implementation performs a full completion and yields it
    /// as a single fragment, for vendors without native streaming.
    async fn open_stream(&self, messages: &[Message], model: &str) -> Result<FragmentStream> {
        let text = self.send_completion(messages, model).await?;
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }

    /// Render an error as the user-facing annotation for this vendor
    fn describe_error(&self, err: &anyhow::Error) -> String {
        ErrorCategory::classify(err).user_message(self.display_name(), self.credential_env())
    }

    /// Complete a prompt; failures come back as annotated text
    async fn complete(&self, prompt: &str, history: &[Message], model: &str) -> String {
        let messages = build_request_messages(prompt, history);
        match self.send_completion(&messages, model).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("{} completion failed: {:#}", self.display_name(), e);
                self.describe_error(&e)
            }
        }
    }

    /// Stream a prompt's completion
    ///
    /// A failure at any point is yielded as one final annotated fragment,
    /// after which the stream ends.
    async fn stream_complete(&self, prompt: &str, history: &[Message], model: &str) -> TextStream {
        let messages = build_request_messages(prompt, history);
        match self.open_stream(&messages, model).await {
            Ok(fragments) => {
                let vendor = self.display_name().to_string();
                let credential_env = self.credential_env().to_string();
                terminate_on_error(fragments, move |e| {
                    tracing::error!("{} stream failed: {:#}", vendor, e);
                    ErrorCategory::classify(e).user_message(&vendor, &credential_env)
                })
            }
            Err(e) => {
                tracing::error!("{} stream could not start: {:#}", self.display_name(), e);
                let text = self.describe_error(&e);
                Box::pin(stream::once(async move { text }))
            }
        }
    }
}

/// Map a fallible fragment stream to text, ending after the first error
pub fn terminate_on_error<F>(fragments: FragmentStream, describe: F) -> TextStream
where
    F: Fn(&anyhow::Error) -> String + Send + 'static,
{
    Box::pin(
        fragments
            .map(move |item| match item {
                Ok(text) => (text, false),
                Err(e) => (describe(&e), true),
            })
            .scan(false, |ended, (text, is_error)| {
                if *ended {
                    return futures::future::ready(None);
                }
                *ended = is_error;
                futures::future::ready(Some(text))
            }),
    )
}
