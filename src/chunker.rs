//! Document chunking for retrieval indexing
//!
//! Splits raw document text into bounded, overlapping segments. Paragraphs
//! (separated by blank lines) are the primary unit; paragraphs longer than the
//! target size are broken into sentence-like units, and any unit that still
//! cannot fit next to an overlap seed is packed word by word (or, for a single
//! enormous token, cut at character boundaries).
//!
//! All sizes are measured in characters, not bytes.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Default target chunk size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between adjacent chunks in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

fn paragraph_break() -> &'static Regex {
    static PARAGRAPH_BREAK: OnceLock<Regex> = OnceLock::new();
    PARAGRAPH_BREAK.get_or_init(|| Regex::new(r"\n\s*\n").expect("paragraph regex is valid"))
}

/// Split text into ordered, overlapping chunks
///
/// Units are joined with a single space. Whenever the next unit would push
/// the running buffer past `target_size`, the buffer is emitted as a chunk and
/// the next buffer starts with the last `overlap` characters of that chunk
/// (nothing when the chunk is not longer than `overlap`). When the next unit
/// cannot fit beside the full seed, the seed is shortened from the front,
/// down to nothing for a unit of `target_size` characters. The size bound
/// always wins over overlap.
///
/// # Arguments
///
/// * `text` - Raw document text
/// * `target_size` - Maximum chunk length in characters
/// * `overlap` - Characters carried from the end of one chunk into the next
///
/// # Returns
///
/// Chunks in document order; empty input yields an empty vector.
///
/// # Examples
///
/// ```
/// use botchat::chunker::chunk_text;
///
/// let chunks = chunk_text("First paragraph.\n\nSecond paragraph.", 1000, 200);
/// assert_eq!(chunks, vec!["First paragraph. Second paragraph.".to_string()]);
///
/// assert!(chunk_text("   ", 1000, 200).is_empty());
/// ```
pub fn chunk_text(text: &str, target_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let target_size = target_size.max(1);
    let overlap = overlap.min(target_size - 1);
    // A unit this small always fits after a full overlap seed plus separator.
    let piece_limit = target_size.saturating_sub(overlap + 1).max(1);

    let mut builder = ChunkBuilder::new(target_size, overlap);

    for paragraph in paragraph_break()
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        if char_len(paragraph) <= target_size {
            builder.push(paragraph);
            continue;
        }

        for sentence in split_sentences(paragraph) {
            if char_len(sentence) <= piece_limit {
                builder.push(sentence);
            } else {
                for piece in split_oversized(sentence, piece_limit) {
                    builder.push(&piece);
                }
            }
        }
    }

    builder.finish()
}

/// Running buffer that accumulates units into chunks
struct ChunkBuilder {
    target_size: usize,
    overlap: usize,
    buffer: String,
    /// True once the buffer holds content beyond the overlap seed
    fresh: bool,
    chunks: Vec<String>,
}

impl ChunkBuilder {
    fn new(target_size: usize, overlap: usize) -> Self {
        Self {
            target_size,
            overlap,
            buffer: String::new(),
            fresh: false,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, unit: &str) {
        let unit_len = char_len(unit);

        if !self.buffer.is_empty() && self.joined_len(unit_len) > self.target_size {
            if self.fresh {
                self.flush();
            }
            // Only the seed is left; shorten it so the unit still fits.
            if !self.buffer.is_empty() && self.joined_len(unit_len) > self.target_size {
                let keep = self.target_size.saturating_sub(unit_len + 1);
                self.buffer = tail_chars(&self.buffer, keep).trim_start().to_string();
            }
        }

        if !self.buffer.is_empty() {
            self.buffer.push(' ');
        }
        self.buffer.push_str(unit);
        self.fresh = true;
    }

    fn joined_len(&self, unit_len: usize) -> usize {
        char_len(&self.buffer) + 1 + unit_len
    }

    fn flush(&mut self) {
        let chunk = self.buffer.trim().to_string();
        self.buffer = if char_len(&chunk) > self.overlap {
            tail_chars(&chunk, self.overlap).trim_start().to_string()
        } else {
            String::new()
        };
        self.fresh = false;
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    fn finish(mut self) -> Vec<String> {
        if self.fresh {
            self.flush();
        }
        self.chunks
    }
}

/// Split a paragraph after each run of `.`, `!`, `?` or newline
///
/// Text after the last terminator is kept as a final unit.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0;
    let mut in_terminator = false;

    for (idx, ch) in paragraph.char_indices() {
        let is_terminator = matches!(ch, '.' | '!' | '?' | '\n');
        if in_terminator && !is_terminator {
            units.push(&paragraph[start..idx]);
            start = idx;
        }
        in_terminator = is_terminator;
    }
    units.push(&paragraph[start..]);

    units
        .into_iter()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .collect()
}

/// Pack the words of an oversized unit into pieces of at most `limit` characters
fn split_oversized(unit: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in unit.split_whitespace() {
        let word_len = char_len(word);

        if word_len > limit {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            pieces.extend(chars.chunks(limit).map(|window| window.iter().collect()));
            continue;
        }

        let needed = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };

        if needed > limit {
            pieces.push(std::mem::replace(&mut current, word.to_string()));
            current_len = word_len;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_len = needed;
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s`, respecting UTF-8 boundaries
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// A bounded segment of a source document prepared for indexing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Text of this segment
    pub source_text: String,
    /// Position of this chunk within its document, starting at 0
    pub sequence_index: usize,
    /// Identifier of the document the chunk came from (the file name)
    pub source_document: String,
    /// Session the document was uploaded under
    pub session_id: String,
}

impl Chunk {
    /// Stable record id used by the retrieval service
    ///
    /// Scoped by session so the same file name uploaded to two sessions
    /// produces distinct records.
    pub fn record_id(&self) -> String {
        format!(
            "{}:{}-{}",
            self.session_id, self.source_document, self.sequence_index
        )
    }

    /// Convert to the ingestion record sent to the retrieval service
    pub fn to_record(&self, timestamp: DateTime<Utc>) -> ChunkRecord {
        ChunkRecord {
            id: self.record_id(),
            text: self.source_text.clone(),
            file_name: self.source_document.clone(),
            chunk_index: self.sequence_index,
            timestamp: timestamp.to_rfc3339(),
            session_id: self.session_id.clone(),
        }
    }
}

/// Ingestion record upserted into the retrieval service, one per chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
    pub file_name: String,
    pub chunk_index: usize,
    pub timestamp: String,
    pub session_id: String,
}

/// Chunk a whole document and tag each segment with its owner
///
/// # Examples
///
/// ```
/// use botchat::chunker::chunk_document;
///
/// let chunks = chunk_document("Hello world.", "notes.txt", "session-1", 1000, 200);
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].sequence_index, 0);
/// assert_eq!(chunks[0].record_id(), "session-1:notes.txt-0");
/// ```
pub fn chunk_document(
    text: &str,
    source_document: &str,
    session_id: &str,
    target_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    chunk_text(text, target_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(sequence_index, source_text)| Chunk {
            source_text,
            sequence_index,
            source_document: source_document.to_string(),
            session_id: session_id.to_string(),
        })
        .collect()
}
