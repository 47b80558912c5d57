//! Pinecone retrieval client
//!
//! Uses the index's integrated-embedding record API: text goes in, Pinecone
//! embeds it server-side, and searches return the stored fields.

use crate::chunker::ChunkRecord;
use crate::config::RetrievalConfig;
use crate::error::{BotchatError, Result};
use crate::retrieval::{RetrievalClient, RetrievalHit, RetrievalQuery};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// API version sent with every request
pub const PINECONE_API_VERSION: &str = "2025-01";

/// Largest number of records per upsert request
pub const UPSERT_BATCH_SIZE: usize = 96;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: SearchQuery<'a>,
    fields: [&'static str; 2],
}

#[derive(Debug, Serialize)]
struct SearchQuery<'a> {
    top_k: usize,
    inputs: SearchInputs<'a>,
    filter: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct SearchInputs<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_score", default)]
    score: f64,
    #[serde(default)]
    fields: serde_json::Map<String, serde_json::Value>,
}

impl SearchHit {
    fn text(&self) -> String {
        ["text", "chunk_text"]
            .iter()
            .filter_map(|key| self.fields.get(*key).and_then(|v| v.as_str()))
            .find(|t| !t.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

/// Retrieval client backed by a Pinecone index host
pub struct PineconeRetrievalClient {
    client: Client,
    host: String,
    api_key: String,
    namespace: String,
}

impl PineconeRetrievalClient {
    /// Create a client from retrieval configuration
    ///
    /// # Errors
    ///
    /// Returns `BotchatError::Config` when the host or API key is missing
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let host = config
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BotchatError::Config("retrieval.host is not set".to_string()))?;
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| BotchatError::Config("PINECONE_API_KEY is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("botchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BotchatError::Retrieval(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Pinecone retrieval: host={}, namespace={}",
            host,
            config.namespace
        );

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
            namespace: config.namespace.clone(),
        })
    }

    fn records_url(&self, action: &str) -> String {
        format!(
            "{}/records/namespaces/{}/{}",
            self.host, self.namespace, action
        )
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
    }

    async fn send(&self, request: reqwest::RequestBuilder, action: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            BotchatError::Retrieval(format!("Pinecone {} request failed: {}", action, e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!("Pinecone {} returned {}: {}", action, status, body);
        Err(BotchatError::Retrieval(format!(
            "Pinecone {} returned {}: {}",
            action, status, body
        ))
        .into())
    }
}

#[async_trait]
impl RetrievalClient for PineconeRetrievalClient {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RetrievalHit>> {
        let body = SearchRequest {
            query: SearchQuery {
                top_k: query.top_k,
                inputs: SearchInputs { text: &query.text },
                filter: json!({ "sessionId": query.session_id }),
            },
            fields: ["text", "chunk_text"],
        };
        tracing::debug!(
            "Pinecone search: session={}, top_k={}",
            query.session_id,
            query.top_k
        );

        let response = self
            .send(self.post(&self.records_url("search")).json(&body), "search")
            .await?;
        let parsed: SearchResponse = response.json().await.map_err(|e| {
            BotchatError::Retrieval(format!("Failed to parse Pinecone search response: {}", e))
        })?;

        Ok(parsed
            .result
            .map(|r| r.hits)
            .unwrap_or_default()
            .into_iter()
            .map(|hit| RetrievalHit {
                text: hit.text(),
                score: hit.score,
            })
            .collect())
    }

    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let mut body = String::new();
            for record in batch {
                body.push_str(&serde_json::to_string(record)?);
                body.push('\n');
            }
            let request = self
                .post(&self.records_url("upsert"))
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(body);
            self.send(request, "upsert").await?;
            tracing::debug!("Upserted batch of {} records", batch.len());
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let body = json!({
            "namespace": self.namespace,
            "filter": { "sessionId": { "$eq": session_id } },
        });
        let url = format!("{}/vectors/delete", self.host);
        self.send(self.post(&url).json(&body), "delete").await?;
        tracing::info!("Purged indexed chunks for session {}", session_id);
        Ok(())
    }
}
