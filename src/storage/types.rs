use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title every session starts with until one is generated or chosen
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    /// Label used in exports and title prompts
    pub fn label(self) -> &'static str {
        match self {
            Sender::User => "User",
            Sender::Bot => "Bot",
        }
    }
}

/// One entry in a session's message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Creates a user message stamped with the current time
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a bot message stamped with the current time
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Metadata for a conversation session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for the session
    pub id: String,
    /// User-facing title
    pub title: String,
    /// When the session was created
    pub created: DateTime<Utc>,
}

impl Session {
    /// Creates a session with the default title
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            created: Utc::now(),
        }
    }

    /// Whether the title is still the untouched default
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_SESSION_TITLE
    }
}

/// On-disk shape of a message
///
/// Older logs may lack a timestamp; it is backfilled on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl StoredMessage {
    /// Convert to a live message, filling a missing timestamp with `now`
    pub fn into_message(self, now: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            sender: self.sender,
            text: self.text,
            timestamp: self.timestamp.unwrap_or(now),
        }
    }
}

impl From<&ChatMessage> for StoredMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            sender: message.sender,
            text: message.text.clone(),
            timestamp: Some(message.timestamp),
        }
    }
}

/// Decode a persisted message log, backfilling timestamps
pub fn decode_messages(json: &[u8]) -> serde_json::Result<Vec<ChatMessage>> {
    let stored: Vec<StoredMessage> = serde_json::from_slice(json)?;
    let now = Utc::now();
    Ok(stored.into_iter().map(|m| m.into_message(now)).collect())
}

/// Encode a message log for persistence
pub fn encode_messages(messages: &[ChatMessage]) -> serde_json::Result<Vec<u8>> {
    let stored: Vec<StoredMessage> = messages.iter().map(StoredMessage::from).collect();
    serde_json::to_vec(&stored)
}
