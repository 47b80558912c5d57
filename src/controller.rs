//! Conversation controller
//!
//! The facade callers use to run turns. A turn appends the user message,
//! optionally augments the prompt with retrieved context, asks the
//! orchestrator for a reply, records exactly one bot message, and may kick
//! off title generation in the background.

use crate::config::{ChunkingConfig, Config};
use crate::error::{BotchatError, Result, ERROR_MARKER};
use crate::export::validate_message;
use crate::memory::prepare_history;
use crate::orchestrator::{Orchestrator, StreamEvent};
use crate::providers::{history_to_messages, ProviderRegistry};
use crate::retrieval::{
    augment_best_effort, ingest_document, PineconeRetrievalClient, RetrievalClient,
};
use crate::session::SessionStore;
use crate::storage::{open_repository, ChatMessage, Session};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Tunables for turn handling
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub max_message_length: usize,
    pub title_min_messages: usize,
    pub title_context_messages: usize,
    pub verbatim_history_limit: usize,
    pub summary_keep_recent: usize,
    pub top_k: usize,
    pub purge_on_session_delete: bool,
    pub chunking: ChunkingConfig,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_message_length: config.chat.max_message_length,
            title_min_messages: config.chat.title_min_messages,
            title_context_messages: config.chat.title_context_messages,
            verbatim_history_limit: config.chat.verbatim_history_limit,
            summary_keep_recent: config.chat.summary_keep_recent,
            top_k: config.retrieval.top_k,
            purge_on_session_delete: config.retrieval.purge_on_session_delete,
            chunking: config.chunking,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Per-turn choices made by the caller
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    /// Requested model; `None` uses the configured default
    pub model: Option<String>,
    /// Augment the prompt with retrieved context
    pub retrieval: bool,
}

impl TurnOptions {
    pub fn new(model: Option<String>, retrieval: bool) -> Self {
        Self { model, retrieval }
    }
}

/// The bot side of a completed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub session_id: String,
    pub text: String,
    /// The reply is an error annotation rather than model output
    pub is_error: bool,
    /// A streamed reply was cancelled by the caller
    pub cancelled: bool,
}

/// Marks a session as having a turn in flight until dropped
struct TurnGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl TurnGuard {
    fn acquire(in_flight: &Arc<Mutex<HashSet<String>>>, session_id: &str) -> Result<Self> {
        let mut set = in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if !set.insert(session_id.to_string()) {
            return Err(BotchatError::TurnInProgress(session_id.to_string()).into());
        }
        Ok(Self {
            in_flight: in_flight.clone(),
            session_id: session_id.to_string(),
        })
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        set.remove(&self.session_id);
    }
}

/// Turn facade over the session store, orchestrator, and retrieval client
pub struct ConversationController {
    store: Arc<Mutex<SessionStore>>,
    orchestrator: Orchestrator,
    retrieval: Option<Arc<dyn RetrievalClient>>,
    settings: ControllerSettings,
    in_flight: Arc<Mutex<HashSet<String>>>,
    title_jobs: Arc<Mutex<HashSet<String>>>,
    tracker: TaskTracker,
}

impl ConversationController {
    pub fn new(
        store: SessionStore,
        orchestrator: Orchestrator,
        retrieval: Option<Arc<dyn RetrievalClient>>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            orchestrator,
            retrieval,
            settings,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            title_jobs: Arc::new(Mutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
        }
    }

    /// Wire up storage, providers, and retrieval from configuration
    ///
    /// A retrieval client is built whenever a host and key are available,
    /// so uploads work even when prompt augmentation is off.
    ///
    /// # Errors
    ///
    /// Returns error if storage cannot be opened or a provider client fails
    /// to initialize
    pub fn from_config(config: &Config) -> Result<Self> {
        let repo = open_repository(&config.storage)?;
        let store = SessionStore::open(repo)?;
        let registry = Arc::new(ProviderRegistry::from_config(&config.provider)?);
        let orchestrator = Orchestrator::new(registry)
            .with_stream_timeout(Duration::from_secs(config.chat.stream_timeout_seconds));

        let retrieval: Option<Arc<dyn RetrievalClient>> =
            match (&config.retrieval.host, &config.retrieval.api_key) {
                (Some(_), Some(_)) => match PineconeRetrievalClient::new(&config.retrieval) {
                    Ok(client) => Some(Arc::new(client)),
                    Err(e) => {
                        tracing::warn!("Retrieval disabled: {:#}", e);
                        None
                    }
                },
                _ => {
                    if config.retrieval.enabled {
                        tracing::warn!("Retrieval is enabled but no host/API key is configured");
                    }
                    None
                }
            };

        Ok(Self::new(
            store,
            orchestrator,
            retrieval,
            ControllerSettings::from_config(config),
        ))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn has_retrieval(&self) -> bool {
        self.retrieval.is_some()
    }

    /// Run a single-shot turn against the active session
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` for blank input, which is ignored
    ///
    /// # Errors
    ///
    /// Returns a validation error for oversized input, `TurnInProgress` when
    /// the session already has a turn running, or a storage error
    pub async fn send_turn(&self, text: &str, options: &TurnOptions) -> Result<Option<TurnReply>> {
        let Some(turn) = self.begin_turn(text, options).await? else {
            return Ok(None);
        };

        let reply = self
            .orchestrator
            .respond(&turn.prompt, &turn.history, options.model.as_deref())
            .await;
        self.lock_store()?
            .append_message(&turn.session_id, ChatMessage::bot(reply.clone()))?;

        self.maybe_generate_title(&turn.session_id, options.model.clone());
        Ok(Some(TurnReply {
            is_error: reply.starts_with(ERROR_MARKER),
            session_id: turn.session_id,
            text: reply,
            cancelled: false,
        }))
    }

    /// Run a streamed turn, reporting each fragment to `on_fragment`
    ///
    /// A placeholder bot message is appended first and its text grows as
    /// fragments arrive; it is persisted once the stream ends. Cancelling
    /// `cancel` stops the stream and keeps whatever text arrived.
    ///
    /// # Errors
    ///
    /// Same as [`send_turn`](Self::send_turn)
    pub async fn send_turn_streaming<F>(
        &self,
        text: &str,
        options: &TurnOptions,
        cancel: CancellationToken,
        mut on_fragment: F,
    ) -> Result<Option<TurnReply>>
    where
        F: FnMut(&str) + Send,
    {
        let Some(turn) = self.begin_turn(text, options).await? else {
            return Ok(None);
        };
        let session_id = turn.session_id.clone();

        self.lock_store()?
            .append_message(&session_id, ChatMessage::bot(""))?;

        let mut events =
            self.orchestrator
                .respond_streaming(turn.prompt, turn.history, options.model.clone());
        let mut accumulated = String::new();
        let mut failure: Option<String> = None;
        let mut cancelled = false;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Streaming reply cancelled for session {}", session_id);
                    cancelled = true;
                    break;
                }
                event = events.next() => event,
            };
            match event {
                Some(StreamEvent::Start) => {}
                Some(StreamEvent::Chunk { content }) => {
                    accumulated.push_str(&content);
                    self.lock_store()?
                        .set_last_message_text(&session_id, &accumulated);
                    on_fragment(&content);
                }
                Some(StreamEvent::Done) | None => break,
                Some(StreamEvent::Error { error }) => {
                    failure = Some(error);
                    break;
                }
            }
        }
        drop(events);

        let (final_text, is_error) = match failure {
            Some(detail) => {
                let annotation = error_annotation(&detail);
                on_fragment(&annotation);
                if accumulated.is_empty() {
                    (annotation, true)
                } else {
                    (format!("{}\n\n{}", accumulated, annotation), true)
                }
            }
            None if cancelled && accumulated.is_empty() => ("_(response cancelled)_".to_string(), false),
            None => {
                let is_error = accumulated.starts_with(ERROR_MARKER);
                (accumulated, is_error)
            }
        };

        self.lock_store()?
            .finalize_last_message(&session_id, &final_text)?;

        self.maybe_generate_title(&session_id, options.model.clone());
        Ok(Some(TurnReply {
            session_id,
            text: final_text,
            is_error,
            cancelled,
        }))
    }

    /// Chunk a document and index it under a session (active when `None`)
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no retrieval client is available
    pub async fn ingest(&self, text: &str, file_name: &str, session_id: Option<&str>) -> Result<usize> {
        let client = self.retrieval.clone().ok_or_else(|| {
            BotchatError::Config(
                "Retrieval is not configured; set PINECONE_HOST and PINECONE_API_KEY".to_string(),
            )
        })?;
        let session_id = match session_id {
            Some(id) => self.lock_store()?.resolve_id(id)?,
            None => self.lock_store()?.active_id().to_string(),
        };
        ingest_document(
            client.as_ref(),
            text,
            file_name,
            &session_id,
            self.settings.chunking,
        )
        .await
    }

    /// Create a session and make it active
    pub fn create_session(&self, title: Option<&str>) -> Result<Session> {
        self.lock_store()?.create_session(title)
    }

    /// Switch to a session by id or unambiguous prefix
    pub fn switch_session(&self, id_or_prefix: &str) -> Result<Session> {
        let mut store = self.lock_store()?;
        let id = store.resolve_id(id_or_prefix)?;
        store.switch_session(&id)?;
        store
            .session(&id)
            .cloned()
            .ok_or_else(|| BotchatError::SessionNotFound(id).into())
    }

    /// Delete a session by id or prefix, purging its indexed chunks if set
    ///
    /// Purging is best effort; a failure is logged and the deletion stands.
    pub async fn delete_session(&self, id_or_prefix: &str) -> Result<String> {
        let id = {
            let mut store = self.lock_store()?;
            let id = store.resolve_id(id_or_prefix)?;
            store.delete_session(&id)?;
            id
        };

        if self.settings.purge_on_session_delete {
            if let Some(client) = &self.retrieval {
                if let Err(e) = client.delete_session(&id).await {
                    tracing::warn!("Failed to purge indexed chunks for {}: {:#}", id, e);
                }
            }
        }
        Ok(id)
    }

    /// Rename a session by id or prefix
    pub fn rename_session(&self, id_or_prefix: &str, title: &str) -> Result<()> {
        let mut store = self.lock_store()?;
        let id = store.resolve_id(id_or_prefix)?;
        store.rename_session(&id, title)
    }

    /// Empty the active session's log
    pub fn clear_messages(&self) -> Result<()> {
        self.lock_store()?.clear_messages()
    }

    pub fn sessions(&self) -> Result<Vec<Session>> {
        Ok(self.lock_store()?.sessions().to_vec())
    }

    pub fn active_session(&self) -> Result<Session> {
        let store = self.lock_store()?;
        store
            .active_session()
            .cloned()
            .ok_or_else(|| BotchatError::SessionNotFound(store.active_id().to_string()).into())
    }

    /// The active session's log
    pub fn messages(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.lock_store()?.messages().to_vec())
    }

    /// Any session's log, by id or prefix
    pub fn messages_for(&self, id_or_prefix: &str) -> Result<Vec<ChatMessage>> {
        let store = self.lock_store()?;
        let id = store.resolve_id(id_or_prefix)?;
        store.messages_for(&id)
    }

    /// Wait for pending title jobs to finish
    pub async fn wait_for_background_tasks(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, SessionStore>> {
        self.store
            .lock()
            .map_err(|_| BotchatError::Storage("Session store lock poisoned".to_string()).into())
    }

    /// Validate input, claim the session, record the user message, and
    /// build the prompt plus provider history
    async fn begin_turn(&self, text: &str, options: &TurnOptions) -> Result<Option<PreparedTurn>> {
        if text.trim().is_empty() {
            tracing::debug!("Ignoring blank message");
            return Ok(None);
        }
        validate_message(text, self.settings.max_message_length)?;

        let (guard, prior) = {
            let mut store = self.lock_store()?;
            let session_id = store.active_id().to_string();
            let guard = TurnGuard::acquire(&self.in_flight, &session_id)?;
            let prior = store.messages().to_vec();
            store.append_message(&session_id, ChatMessage::user(text))?;
            (guard, prior)
        };
        let session_id = guard.session_id.clone();

        let prompt = match (&self.retrieval, options.retrieval) {
            (Some(client), true) => {
                augment_best_effort(client.as_ref(), text, &session_id, self.settings.top_k).await
            }
            _ => text.to_string(),
        };

        let history = prepare_history(
            history_to_messages(&prior),
            self.settings.verbatim_history_limit,
            self.settings.summary_keep_recent,
        );

        Ok(Some(PreparedTurn {
            session_id,
            prompt,
            history,
            _guard: guard,
        }))
    }

    /// Start title generation for a session if it is due and none is pending
    fn maybe_generate_title(&self, session_id: &str, model: Option<String>) {
        let messages = {
            let Ok(store) = self.lock_store() else {
                return;
            };
            match store.session(session_id) {
                Some(session) if session.has_default_title() => {}
                _ => return,
            }
            match store.messages_for(session_id) {
                Ok(messages) if messages.len() >= self.settings.title_min_messages => messages,
                _ => return,
            }
        };

        {
            let mut jobs = self.title_jobs.lock().unwrap_or_else(|p| p.into_inner());
            if !jobs.insert(session_id.to_string()) {
                return;
            }
        }

        let store = self.store.clone();
        let jobs = self.title_jobs.clone();
        let orchestrator = self.orchestrator.clone();
        let context = self.settings.title_context_messages;
        let session_id = session_id.to_string();

        self.tracker.spawn(async move {
            match orchestrator
                .generate_title(&messages, model.as_deref(), context)
                .await
            {
                Ok(title) => {
                    let applied = store
                        .lock()
                        .map_err(|_| anyhow::anyhow!("Session store lock poisoned"))
                        .and_then(|mut s| s.rename_session_if_default(&session_id, &title));
                    match applied {
                        Ok(true) => tracing::info!("Session {} titled '{}'", session_id, title),
                        Ok(false) => tracing::debug!("Kept existing title for {}", session_id),
                        Err(e) => tracing::warn!("Failed to save title: {:#}", e),
                    }
                }
                Err(e) => tracing::warn!("Title generation failed for {}: {:#}", session_id, e),
            }
            jobs.lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&session_id);
        });
    }
}

struct PreparedTurn {
    session_id: String,
    prompt: String,
    history: Vec<crate::providers::Message>,
    _guard: TurnGuard,
}

/// In-band annotation for an orchestrator-level failure
pub fn error_annotation(detail: &str) -> String {
    format!(
        "{} **Error**: Unable to get response from AI. {}",
        ERROR_MARKER, detail
    )
}
