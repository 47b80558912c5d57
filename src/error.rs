//! Error types for Botchat
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling, plus the classification
//! that turns provider failures into user-facing annotated text.

use thiserror::Error;

/// Main error type for Botchat operations
///
/// This enum covers configuration loading, provider interactions,
/// retrieval calls, session persistence, and input validation.
#[derive(Error, Debug)]
pub enum BotchatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing credentials for provider
    #[error("Missing credentials for provider: {0}")]
    MissingCredentials(String),

    /// Authentication errors (e.g., 401 Unauthorized)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Usage or rate limit exceeded at the vendor
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Connectivity failure while reaching a remote service
    #[error("Network error: {0}")]
    Network(String),

    /// Provider-related errors (bad responses, unexpected payloads)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Input rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced session does not exist
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A turn is already running against this session
    #[error("A turn is already in progress for session {0}")]
    TurnInProgress(String),

    /// Retrieval service errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Session storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type alias for Botchat operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

/// User-legible failure categories for provider calls
///
/// Every provider failure lands in exactly one category, and each category
/// renders to a fixed annotated message that is shown as the bot's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or invalid credential
    Configuration,
    /// Rate or usage limit exceeded
    Quota,
    /// Connectivity failure
    Network,
    /// Anything else
    Generic,
}

impl ErrorCategory {
    /// Classify an error by walking its cause chain
    ///
    /// # Examples
    ///
    /// ```
    /// use botchat::error::{BotchatError, ErrorCategory};
    ///
    /// let err = anyhow::Error::from(BotchatError::QuotaExceeded("429".into()));
    /// assert_eq!(ErrorCategory::classify(&err), ErrorCategory::Quota);
    /// ```
    pub fn classify(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<BotchatError>() {
                match e {
                    BotchatError::MissingCredentials(_)
                    | BotchatError::Authentication(_)
                    | BotchatError::Config(_) => return Self::Configuration,
                    BotchatError::QuotaExceeded(_) => return Self::Quota,
                    BotchatError::Network(_) => return Self::Network,
                    BotchatError::Http(inner) if inner.is_connect() || inner.is_timeout() => {
                        return Self::Network
                    }
                    _ => {}
                }
            }
            if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
                if e.is_connect() || e.is_timeout() {
                    return Self::Network;
                }
            }
        }
        Self::Generic
    }

    /// Whether a caller may reasonably retry automatically
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network)
    }

    /// Render the in-band annotated message for a vendor
    ///
    /// # Arguments
    ///
    /// * `vendor` - Display name of the vendor (e.g. "OpenAI")
    /// * `credential_env` - Environment variable that holds the vendor's key
    pub fn user_message(self, vendor: &str, credential_env: &str) -> String {
        match self {
            Self::Configuration => format!(
                "❌ **Configuration Error**: Please set your {} API key. Add `{}` to your environment or config file, or run `botchat auth`.",
                vendor, credential_env
            ),
            Self::Quota => format!(
                "❌ **API Quota Exceeded**: You've reached your {} API usage limit. Please check your account or upgrade your plan.",
                vendor
            ),
            Self::Network => format!(
                "❌ **Network Error**: Unable to connect to {}. Please check your internet connection and try again.",
                vendor
            ),
            Self::Generic => {
                "❌ **Error**: Something went wrong while processing your request. Please try again later."
                    .to_string()
            }
        }
    }
}

/// Prefix shared by every in-band error annotation
pub const ERROR_MARKER: &str = "❌";

/// Whether a bot reply is an error annotation rather than model output
pub fn is_error_annotation(text: &str) -> bool {
    text.starts_with(ERROR_MARKER)
}
