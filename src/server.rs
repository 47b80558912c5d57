//! Turn API server
//!
//! JSON and server-sent-event endpoints over the orchestrator and the
//! retrieval client. The server is stateless with respect to sessions:
//! callers send their own conversation history with each request.

use crate::config::{ChunkingConfig, Config};
use crate::error::BotchatError;
use crate::export::validate_message;
use crate::memory::prepare_history;
use crate::orchestrator::Orchestrator;
use crate::providers::{history_to_messages, Message, ProviderRegistry};
use crate::retrieval::{
    augment_best_effort, build_context, ingest_document, PineconeRetrievalClient,
    RetrievalClient, RetrievalHit, RetrievalQuery,
};
use crate::storage::{ChatMessage, Sender};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Session id used by uploads that name none
pub const DEFAULT_UPLOAD_SESSION: &str = "demo-session";

/// Errors returned by route handlers
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{message}")]
    Failed { message: String, details: String },
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
            ServerError::Unavailable(m) => {
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": m }))
            }
            ServerError::Failed { message, details } => {
                tracing::error!(details = %details, "{}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": message, "details": details }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Settings the handlers read on every request
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub max_message_length: usize,
    pub retrieval_enabled: bool,
    pub top_k: usize,
    pub chunking: ChunkingConfig,
    pub title_context_messages: usize,
    pub verbatim_history_limit: usize,
    pub summary_keep_recent: usize,
}

impl ServerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_message_length: config.chat.max_message_length,
            retrieval_enabled: config.retrieval.enabled,
            top_k: config.retrieval.top_k,
            chunking: config.chunking,
            title_context_messages: config.chat.title_context_messages,
            verbatim_history_limit: config.chat.verbatim_history_limit,
            summary_keep_recent: config.chat.summary_keep_recent,
        }
    }
}

/// Shared handler state
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub retrieval: Option<Arc<dyn RetrievalClient>>,
    pub settings: ServerSettings,
}

impl AppState {
    /// Build the state from configuration
    ///
    /// # Errors
    ///
    /// Returns error if a provider client cannot be created
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let registry = Arc::new(ProviderRegistry::from_config(&config.provider)?);
        let orchestrator = Orchestrator::new(registry)
            .with_stream_timeout(Duration::from_secs(config.chat.stream_timeout_seconds));
        let retrieval: Option<Arc<dyn RetrievalClient>> =
            match PineconeRetrievalClient::new(&config.retrieval) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::info!("Retrieval endpoints unavailable: {}", e);
                    None
                }
            };
        Ok(Self {
            orchestrator,
            retrieval,
            settings: ServerSettings::from_config(config),
        })
    }
}

/// One prior message as sent by clients
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryEntry {
    pub sender: Sender,
    pub text: String,
}

impl HistoryEntry {
    fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            sender: self.sender,
            text: self.text.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct TitleRequest {
    #[serde(default)]
    pub messages: Vec<HistoryEntry>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TitleResponse {
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagQueryRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RagQueryResponse {
    pub context: String,
    pub hits: Vec<RetrievalHit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: String,
    pub text: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub name: String,
    pub chunk_count: usize,
}

/// Register every Turn API route
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/chat/generate-title", post(generate_title))
        .route("/api/rag-query", post(rag_query))
        .route("/api/upload", post(upload))
        .with_state(state)
}

/// Bind and serve until the process is interrupted
///
/// # Errors
///
/// Returns error if the address cannot be bound
pub async fn serve(state: Arc<AppState>, bind: &str) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| BotchatError::Config(format!("Failed to bind {}: {}", bind, e)))?;
    tracing::info!("Turn API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down Turn API");
        })
        .await?;
    Ok(())
}

impl AppState {
    fn check_message(&self, message: &str) -> Result<(), ServerError> {
        validate_message(message, self.settings.max_message_length)
            .map_err(|e| ServerError::BadRequest(root_message(&e)))
    }

    /// Prompt plus provider history for a chat request
    async fn prepare(&self, req: &ChatRequest) -> (String, Vec<Message>) {
        let prompt = match (&self.retrieval, &req.session_id) {
            (Some(client), Some(session_id)) if self.settings.retrieval_enabled => {
                augment_best_effort(client.as_ref(), &req.message, session_id, self.settings.top_k)
                    .await
            }
            _ => req.message.clone(),
        };
        let prior: Vec<ChatMessage> = req
            .conversation_history
            .iter()
            .map(HistoryEntry::to_chat_message)
            .collect();
        let history = prepare_history(
            history_to_messages(&prior),
            self.settings.verbatim_history_limit,
            self.settings.summary_keep_recent,
        );
        (prompt, history)
    }
}

fn root_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<BotchatError>() {
        Some(BotchatError::Validation(m)) => m.clone(),
        _ => err.to_string(),
    }
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ServerError> {
    state.check_message(&req.message)?;
    tracing::debug!(model = ?req.model, history = req.conversation_history.len(), "chat request");

    let (prompt, history) = state.prepare(&req).await;
    let response = state
        .orchestrator
        .respond(&prompt, &history, req.model.as_deref())
        .await;
    Ok(Json(ChatResponse { response }))
}

async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ServerError> {
    state.check_message(&req.message)?;
    tracing::debug!(model = ?req.model, "streaming chat request");

    let (prompt, history) = state.prepare(&req).await;
    let events = state
        .orchestrator
        .respond_streaming(prompt, history, req.model.clone())
        .map(|event| {
            let data = serde_json::to_string(&event)
                .unwrap_or_else(|_| r#"{"type":"error","error":"serialization failed"}"#.into());
            Ok::<Event, Infallible>(Event::default().data(data))
        });

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

async fn generate_title(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TitleRequest>,
) -> Result<Json<TitleResponse>, ServerError> {
    if req.messages.is_empty() {
        return Err(ServerError::BadRequest("Messages are required".to_string()));
    }
    let messages: Vec<ChatMessage> = req.messages.iter().map(HistoryEntry::to_chat_message).collect();
    let title = state
        .orchestrator
        .generate_title(
            &messages,
            req.model.as_deref(),
            state.settings.title_context_messages,
        )
        .await
        .map_err(|e| ServerError::Failed {
            message: "Failed to generate title".to_string(),
            details: format!("{:#}", e),
        })?;
    Ok(Json(TitleResponse { title }))
}

async fn rag_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RagQueryRequest>,
) -> Result<Json<RagQueryResponse>, ServerError> {
    let client = state
        .retrieval
        .clone()
        .ok_or_else(|| ServerError::Unavailable("Retrieval is not configured".to_string()))?;
    if req.message.trim().is_empty() || req.session_id.trim().is_empty() {
        return Err(ServerError::BadRequest(
            "Missing message or sessionId".to_string(),
        ));
    }

    let query = RetrievalQuery::new(
        req.message,
        req.session_id,
        req.top_k.unwrap_or(state.settings.top_k),
    );
    let hits = client
        .search(&query)
        .await
        .map_err(|e| ServerError::Failed {
            message: "RAG retrieval failed".to_string(),
            details: format!("{:#}", e),
        })?;
    Ok(Json(RagQueryResponse {
        context: build_context(&hits),
        hits,
    }))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ServerError> {
    let client = state
        .retrieval
        .clone()
        .ok_or_else(|| ServerError::Unavailable("Retrieval is not configured".to_string()))?;
    if req.text.trim().is_empty() {
        return Err(ServerError::BadRequest(
            "No extractable text found in file".to_string(),
        ));
    }
    let session_id = req
        .session_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_UPLOAD_SESSION);

    let chunk_count = ingest_document(
        client.as_ref(),
        &req.text,
        &req.file_name,
        session_id,
        state.settings.chunking,
    )
    .await
    .map_err(|e| ServerError::Failed {
        message: "Upload failed".to_string(),
        details: format!("{:#}", e),
    })?;

    Ok(Json(UploadResponse {
        name: req.file_name,
        chunk_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotchatError;
    use crate::test_utils::{FailingRetrieval, RecordingRetrieval, ScriptedProvider};
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn state(
        provider: ScriptedProvider,
        retrieval: Option<Arc<dyn RetrievalClient>>,
    ) -> Arc<AppState> {
        let mut registry = ProviderRegistry::new("openai", "gpt-4o-mini");
        registry.register(Arc::new(provider));
        let mut settings = ServerSettings::from_config(&Config::default());
        settings.retrieval_enabled = true;
        Arc::new(AppState {
            orchestrator: Orchestrator::new(Arc::new(registry)),
            retrieval,
            settings,
        })
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chat_returns_response() {
        let app = router(state(ScriptedProvider::replying("openai", "Hi there"), None));
        let response = app
            .oneshot(post_json(
                "/api/chat",
                json!({
                    "message": "hello",
                    "conversationHistory": [
                        { "sender": "user", "text": "earlier" },
                        { "sender": "bot", "text": "reply" }
                    ],
                    "model": "gpt-4o-mini"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["response"], "Hi there");
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_message() {
        let app = router(state(ScriptedProvider::replying("openai", "x"), None));
        let response = app
            .oneshot(post_json("/api/chat", json!({ "message": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Message cannot be empty");
    }

    #[tokio::test]
    async fn test_stream_emits_sse_events() {
        let app = router(state(ScriptedProvider::streaming("openai", &["He", "y"]), None));
        let response = app
            .oneshot(post_json("/api/chat/stream", json!({ "message": "hi" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        let events: Vec<serde_json::Value> = body
            .lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .map(|d| serde_json::from_str(d).unwrap())
            .collect();
        let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["start", "chunk", "chunk", "done"]);
        assert_eq!(events[1]["content"], "He");
    }

    #[tokio::test]
    async fn test_generate_title() {
        let app = router(state(ScriptedProvider::replying("openai", "\"Trip Plans\""), None));
        let response = app
            .oneshot(post_json(
                "/api/chat/generate-title",
                json!({ "messages": [{ "sender": "user", "text": "Plan my trip" }] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["title"], "Trip Plans");
    }

    #[tokio::test]
    async fn test_generate_title_requires_messages_and_reports_failure() {
        let app = router(state(
            ScriptedProvider::failing("openai", || BotchatError::Network("down".into())),
            None,
        ));
        let response = app
            .clone()
            .oneshot(post_json("/api/chat/generate-title", json!({ "messages": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json(
                "/api/chat/generate-title",
                json!({ "messages": [{ "sender": "user", "text": "hi" }] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "Failed to generate title");
    }

    #[tokio::test]
    async fn test_rag_query_returns_context() {
        let retrieval = Arc::new(RecordingRetrieval::with_hits(vec!["one", "two"]));
        let app = router(state(ScriptedProvider::replying("openai", "x"), Some(retrieval)));
        let response = app
            .oneshot(post_json(
                "/api/rag-query",
                json!({ "message": "q", "sessionId": "s1", "topK": 2 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["context"], "one\n---\ntwo");
        assert_eq!(body["hits"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rag_query_status_codes() {
        let app = router(state(ScriptedProvider::replying("openai", "x"), None));
        let response = app
            .oneshot(post_json(
                "/api/rag-query",
                json!({ "message": "q", "sessionId": "s1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let app = router(state(
            ScriptedProvider::replying("openai", "x"),
            Some(Arc::new(FailingRetrieval)),
        ));
        let response = app
            .oneshot(post_json(
                "/api/rag-query",
                json!({ "message": "q", "sessionId": "s1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "RAG retrieval failed");
        assert!(body["details"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_chat_with_failing_retrieval_still_answers() {
        let app = router(state(
            ScriptedProvider::replying("openai", "plain answer"),
            Some(Arc::new(FailingRetrieval)),
        ));
        let response = app
            .oneshot(post_json(
                "/api/chat",
                json!({ "message": "hello", "sessionId": "s1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["response"], "plain answer");
    }

    #[tokio::test]
    async fn test_upload_defaults_session() {
        let retrieval = Arc::new(RecordingRetrieval::default());
        let app = router(state(
            ScriptedProvider::replying("openai", "x"),
            Some(retrieval.clone()),
        ));
        let response = app
            .oneshot(post_json(
                "/api/upload",
                json!({ "fileName": "notes.txt", "text": "Hello notes." }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["name"], "notes.txt");
        assert_eq!(body["chunkCount"], 1);
        assert_eq!(retrieval.records()[0].session_id, DEFAULT_UPLOAD_SESSION);
    }
}
