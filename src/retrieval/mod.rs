//! Retrieval-augmented generation
//!
//! A [`RetrievalClient`] talks to the external vector-search service. The
//! helpers here fold search hits into a prompt and push chunked documents
//! into the index. Retrieval is best effort: a failed search never blocks a
//! turn.

pub mod pinecone;

pub use pinecone::PineconeRetrievalClient;

use crate::chunker::{chunk_document, ChunkRecord};
use crate::config::ChunkingConfig;
use crate::error::{BotchatError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Separator placed between retrieved passages
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// A search scoped to one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalQuery {
    pub text: String,
    pub session_id: String,
    pub top_k: usize,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>, session_id: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            session_id: session_id.into(),
            top_k,
        }
    }
}

/// One search result; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub text: String,
    pub score: f64,
}

/// Vector-search service boundary
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    /// Top-K hits for a query, filtered strictly by session id
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RetrievalHit>>;

    /// Write chunk records to the index
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()>;

    /// Remove every record owned by a session
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

/// Join non-empty hit texts into one context block
///
/// # Examples
///
/// ```
/// use botchat::retrieval::{build_context, RetrievalHit};
///
/// let hits = vec![
///     RetrievalHit { text: "alpha".into(), score: 0.9 },
///     RetrievalHit { text: "".into(), score: 0.5 },
///     RetrievalHit { text: "beta".into(), score: 0.4 },
/// ];
/// assert_eq!(build_context(&hits), "alpha\n---\nbeta");
/// ```
pub fn build_context(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .map(|h| h.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Prefix a message with an instruction and the retrieved context
pub fn augment_prompt(message: &str, context: &str) -> String {
    format!(
        "Use the following context from the user's uploaded documents to answer the question. \
If the context is not relevant, answer from your own knowledge.\n\n\
Context:\n{}\n\nQuestion: {}",
        context, message
    )
}

/// Augment a message with retrieved context, falling back to the plain message
///
/// Search failures and empty results are logged and yield the message
/// unchanged.
pub async fn augment_best_effort(
    client: &dyn RetrievalClient,
    message: &str,
    session_id: &str,
    top_k: usize,
) -> String {
    let query = RetrievalQuery::new(message, session_id, top_k);
    match client.search(&query).await {
        Ok(hits) => {
            let context = build_context(&hits);
            if context.is_empty() {
                tracing::debug!("No retrieval context for session {}", session_id);
                message.to_string()
            } else {
                tracing::debug!(
                    "Augmenting prompt with {} retrieved passages for session {}",
                    hits.len(),
                    session_id
                );
                augment_prompt(message, &context)
            }
        }
        Err(e) => {
            tracing::warn!(
                "Retrieval failed for session {}; continuing without context: {:#}",
                session_id,
                e
            );
            message.to_string()
        }
    }
}

/// Chunk a document and upsert it under a session
///
/// # Returns
///
/// Returns the number of chunks written
///
/// # Errors
///
/// Returns `BotchatError::Validation` for empty text, or the client's error
/// when the upsert fails
pub async fn ingest_document(
    client: &dyn RetrievalClient,
    text: &str,
    file_name: &str,
    session_id: &str,
    chunking: ChunkingConfig,
) -> Result<usize> {
    if text.trim().is_empty() {
        return Err(BotchatError::Validation(format!("{} contains no text", file_name)).into());
    }

    let now = Utc::now();
    let records: Vec<ChunkRecord> = chunk_document(
        text,
        file_name,
        session_id,
        chunking.chunk_size,
        chunking.overlap,
    )
    .iter()
    .map(|chunk| chunk.to_record(now))
    .collect();

    tracing::info!(
        "Indexing {} chunks from {} for session {}",
        records.len(),
        file_name,
        session_id
    );
    client.upsert(&records).await?;
    Ok(records.len())
}
