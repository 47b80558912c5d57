//! Session title generation
//!
//! Builds the title prompt from the first few messages of a session and
//! cleans up whatever the model returns.

use crate::error::{BotchatError, Result};
use crate::storage::ChatMessage;

/// Longest title kept, in words
pub const MAX_TITLE_WORDS: usize = 7;

/// Render messages as `User: ...` / `Bot: ...` lines
pub fn title_context(messages: &[ChatMessage], limit: usize) -> String {
    messages
        .iter()
        .take(limit)
        .map(|m| format!("{}: {}", m.sender.label(), m.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt asking for a short conversation title
pub fn build_title_prompt(context: &str) -> String {
    format!(
        "Given the following chat excerpt, generate a short, descriptive title (max {} words) for this conversation.\n\n{}\n\nTitle:",
        MAX_TITLE_WORDS, context
    )
}

/// Normalize a raw model reply into a title
///
/// # Errors
///
/// Returns `BotchatError::Validation` when nothing usable remains
///
/// # Examples
///
/// ```
/// use botchat::title::clean_title;
///
/// let title = clean_title("\"Planning a Trip to Lisbon\"\n").unwrap();
/// assert_eq!(title, "Planning a Trip to Lisbon");
/// ```
pub fn clean_title(raw: &str) -> Result<String> {
    const QUOTES: &[char] = &['"', '\'', '“', '”', '‘', '’', '`'];

    let first_line = raw.trim().lines().next().unwrap_or_default();
    let first_line = first_line
        .trim()
        .strip_prefix("Title:")
        .unwrap_or(first_line.trim());
    let unquoted = first_line.trim().trim_matches(QUOTES).trim();

    let title = unquoted
        .split_whitespace()
        .take(MAX_TITLE_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        return Err(BotchatError::Validation("Generated title is empty".to_string()).into());
    }
    Ok(title)
}
