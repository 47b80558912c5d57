//! Conversation memory strategy
//!
//! Decides, once per turn, whether the prior history is sent verbatim or
//! condensed. Condensing keeps the most recent messages as they are and
//! replaces the older ones with a single summary message.

use crate::providers::Message;

/// History length above which older turns are summarized
pub const DEFAULT_VERBATIM_HISTORY_LIMIT: usize = 20;

/// Messages kept verbatim when summarizing
pub const DEFAULT_SUMMARY_KEEP_RECENT: usize = 10;

const EXCERPT_CHARS: usize = 100;

/// How prior history is presented to a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStrategy {
    /// Send every prior message unchanged
    Verbatim,
    /// Summarize older messages, keep recent ones
    Summarized,
}

/// Pick a strategy for a history of `history_len` messages
///
/// # Examples
///
/// ```
/// use botchat::memory::{choose_memory_strategy, MemoryStrategy};
///
/// assert_eq!(choose_memory_strategy(20, 20), MemoryStrategy::Verbatim);
/// assert_eq!(choose_memory_strategy(21, 20), MemoryStrategy::Summarized);
/// ```
pub fn choose_memory_strategy(history_len: usize, limit: usize) -> MemoryStrategy {
    if history_len > limit {
        MemoryStrategy::Summarized
    } else {
        MemoryStrategy::Verbatim
    }
}

/// Apply a strategy to provider-shaped history
pub fn apply_memory_strategy(
    strategy: MemoryStrategy,
    history: Vec<Message>,
    keep_recent: usize,
) -> Vec<Message> {
    match strategy {
        MemoryStrategy::Verbatim => history,
        MemoryStrategy::Summarized => {
            if history.len() <= keep_recent {
                return history;
            }
            let split = history.len() - keep_recent;
            let mut condensed = Vec::with_capacity(keep_recent + 1);
            condensed.push(summarize(&history[..split]));
            condensed.extend(history.into_iter().skip(split));
            condensed
        }
    }
}

/// Choose and apply in one step
pub fn prepare_history(history: Vec<Message>, limit: usize, keep_recent: usize) -> Vec<Message> {
    let strategy = choose_memory_strategy(history.len(), limit);
    if strategy == MemoryStrategy::Summarized {
        tracing::debug!(
            "Summarizing {} older messages, keeping {} verbatim",
            history.len().saturating_sub(keep_recent),
            keep_recent
        );
    }
    apply_memory_strategy(strategy, history, keep_recent)
}

fn summarize(older: &[Message]) -> Message {
    let user_count = older.iter().filter(|m| m.role == "user").count();
    let assistant_count = older.len() - user_count;

    let mut summary = format!(
        "Summary of {} earlier messages ({} from the user, {} from the assistant).",
        older.len(),
        user_count,
        assistant_count
    );
    if let Some(first) = older.first() {
        summary.push_str(&format!(
            "\nConversation began with {}: \"{}\"",
            first.role,
            excerpt(&first.content)
        ));
    }
    if older.len() > 1 {
        if let Some(last) = older.last() {
            summary.push_str(&format!(
                "\nMost recent summarized {}: \"{}\"",
                last.role,
                excerpt(&last.content)
            ));
        }
    }
    Message::user(summary)
}

fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= EXCERPT_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("question {}", i))
                } else {
                    Message::assistant(format!("answer {}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_threshold_is_inclusive_for_verbatim() {
        assert_eq!(choose_memory_strategy(0, 20), MemoryStrategy::Verbatim);
        assert_eq!(choose_memory_strategy(20, 20), MemoryStrategy::Verbatim);
        assert_eq!(choose_memory_strategy(21, 20), MemoryStrategy::Summarized);
    }

    #[test]
    fn test_verbatim_leaves_history_untouched() {
        let original = history(6);
        let out = prepare_history(original.clone(), 20, 10);
        assert_eq!(out, original);
    }

    #[test]
    fn test_summarized_keeps_recent_and_prepends_summary() {
        let out = prepare_history(history(25), 20, 10);
        assert_eq!(out.len(), 11);
        assert_eq!(out[0].role, "user");
        assert!(out[0].content.starts_with("Summary of 15 earlier messages"));
        assert!(out[0].content.contains("question 0"));
        assert!(out[0].content.contains("question 14"));
        assert_eq!(out[1].content, "answer 15");
        assert_eq!(out[10].content, "question 24");
    }

    #[test]
    fn test_excerpt_truncates_long_text() {
        let long = "x".repeat(250);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
        assert!(cut.ends_with("..."));
    }
}
