//! Conversation export and message utilities
//!
//! Formatting helpers used by the CLI: input validation, exports to JSON,
//! plain text and Markdown, simple statistics, search, and relative time
//! labels.

use crate::error::{BotchatError, Result};
use crate::storage::{ChatMessage, Sender};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::str::FromStr;

/// Reject empty or oversized user input
///
/// # Errors
///
/// Returns `BotchatError::Validation` describing the problem
///
/// # Examples
///
/// ```
/// use botchat::export::validate_message;
///
/// assert!(validate_message("hello", 4000).is_ok());
/// assert!(validate_message("   ", 4000).is_err());
/// ```
pub fn validate_message(text: &str, max_length: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(BotchatError::Validation("Message cannot be empty".to_string()).into());
    }
    if text.chars().count() > max_length {
        return Err(BotchatError::Validation(format!(
            "Message too long (max {} characters)",
            max_length
        ))
        .into());
    }
    Ok(())
}

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Text,
    Markdown,
}

impl ExportFormat {
    /// File extension without the dot
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
            ExportFormat::Markdown => "md",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = BotchatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "txt" | "text" => Ok(Self::Text),
            "md" | "markdown" => Ok(Self::Markdown),
            other => Err(BotchatError::Validation(format!(
                "Unknown export format '{}'. Use json, txt, or md",
                other
            ))),
        }
    }
}

/// Render a conversation in the requested format
///
/// # Errors
///
/// Returns `BotchatError::Validation` for an empty conversation
pub fn export_conversation(messages: &[ChatMessage], format: ExportFormat) -> Result<String> {
    if messages.is_empty() {
        return Err(BotchatError::Validation("No messages to export".to_string()).into());
    }

    let rendered = match format {
        ExportFormat::Json => serde_json::to_string_pretty(messages)?,
        ExportFormat::Text => messages
            .iter()
            .map(|m| format!("{}: {}", m.sender.label().to_uppercase(), m.text))
            .collect::<Vec<_>>()
            .join("\n\n"),
        ExportFormat::Markdown => messages
            .iter()
            .map(|m| format!("**{}**: {}", m.sender.label().to_uppercase(), m.text))
            .collect::<Vec<_>>()
            .join("\n\n"),
    };
    Ok(rendered)
}

/// `conversation-YYYY-MM-DD.ext`
pub fn default_export_filename(format: ExportFormat, date: NaiveDate) -> String {
    format!(
        "conversation-{}.{}",
        date.format("%Y-%m-%d"),
        format.extension()
    )
}

/// Counts and timing for one conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationStats {
    pub total: usize,
    pub user: usize,
    pub bot: usize,
    pub average_length: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

pub fn conversation_stats(messages: &[ChatMessage]) -> ConversationStats {
    let user = messages.iter().filter(|m| m.sender == Sender::User).count();
    let total_chars: usize = messages.iter().map(|m| m.text.chars().count()).sum();
    ConversationStats {
        total: messages.len(),
        user,
        bot: messages.len() - user,
        average_length: if messages.is_empty() {
            0
        } else {
            total_chars / messages.len()
        },
        first: messages.first().map(|m| m.timestamp),
        last: messages.last().map(|m| m.timestamp),
    }
}

/// One-line summary such as `4 messages (2 from you, 2 from AI)`
pub fn conversation_summary(messages: &[ChatMessage]) -> String {
    let stats = conversation_stats(messages);
    format!(
        "{} messages ({} from you, {} from AI)",
        stats.total, stats.user, stats.bot
    )
}

/// Case-insensitive substring search, returning positions and messages
pub fn search_messages<'a>(messages: &'a [ChatMessage], query: &str) -> Vec<(usize, &'a ChatMessage)> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.text.to_lowercase().contains(&needle))
        .collect()
}

/// Human label for how long ago `timestamp` was, relative to `now`
pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if elapsed.num_hours() < 24 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        timestamp.format("%Y-%m-%d").to_string()
    }
}
