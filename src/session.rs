//! Session store
//!
//! Owns the set of sessions, the active-session pointer, and the active
//! session's message log. Every mutation is written through to the
//! [`SessionRepository`] before the call returns.

use crate::error::{BotchatError, Result};
use crate::storage::{ChatMessage, Sender, Session, SessionRepository, DEFAULT_SESSION_TITLE};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Sessions plus the active session's visible log
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    sessions: Vec<Session>,
    active_id: String,
    messages: Vec<ChatMessage>,
    retired: HashSet<String>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .field("active_id", &self.active_id)
            .field("messages", &self.messages.len())
            .finish()
    }
}

impl SessionStore {
    /// Load persisted state, repairing a dangling active pointer
    ///
    /// With no sessions at all, a default session is synthesized. An active
    /// pointer that names a missing session moves to the first session.
    ///
    /// # Errors
    ///
    /// Returns error if the repository cannot be read or written
    pub fn open(repo: Arc<dyn SessionRepository>) -> Result<Self> {
        let sessions = repo.load_sessions()?;
        let saved_active = repo.load_active()?;

        let mut store = Self {
            repo,
            sessions,
            active_id: String::new(),
            messages: Vec::new(),
            retired: HashSet::new(),
        };

        let active = saved_active.filter(|id| store.contains(id));
        match (active, store.sessions.first().map(|s| s.id.clone())) {
            (Some(id), _) => {
                store.active_id = id;
                store.messages = store.repo.load_messages(&store.active_id)?;
            }
            (None, Some(first)) => {
                tracing::debug!("Active session pointer missing or stale; selecting {}", first);
                store.activate(&first)?;
            }
            (None, None) => {
                tracing::debug!("No sessions found; creating a default session");
                store.create_session(None)?;
            }
        }

        tracing::info!(
            "Opened session store: {} sessions, active={}",
            store.sessions.len(),
            store.active_id
        );
        Ok(store)
    }

    /// Create a session, make it active, and show an empty log
    ///
    /// # Errors
    ///
    /// Returns error if persistence fails
    pub fn create_session(&mut self, title: Option<&str>) -> Result<Session> {
        let id = self.fresh_id();
        let mut session = Session::new(id);
        if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
            session.title = title.to_string();
        }

        let mut sessions = self.sessions.clone();
        sessions.insert(0, session.clone());
        self.repo.save_messages(&session.id, &[])?;
        self.repo.save_sessions(&sessions)?;

        self.sessions = sessions;
        self.active_id = session.id.clone();
        self.messages.clear();
        self.repo.save_active(&self.active_id)?;

        tracing::debug!("Created session {}", session.id);
        Ok(session)
    }

    /// Make `id` the active session and load its log
    ///
    /// # Errors
    ///
    /// Returns `BotchatError::SessionNotFound` for an unknown id; the active
    /// session is left unchanged
    pub fn switch_session(&mut self, id: &str) -> Result<()> {
        if !self.contains(id) {
            return Err(BotchatError::SessionNotFound(id.to_string()).into());
        }
        self.activate(id)
    }

    /// Remove a session and its log
    ///
    /// Deleting the active session selects the first remaining session, or
    /// synthesizes a new default session when none remain.
    ///
    /// A failed index write leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// Returns `BotchatError::SessionNotFound` for an unknown id
    pub fn delete_session(&mut self, id: &str) -> Result<()> {
        let position = self
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| BotchatError::SessionNotFound(id.to_string()))?;

        let mut remaining = self.sessions.clone();
        remaining.remove(position);
        if remaining.is_empty() {
            let replacement = Session::new(self.fresh_id());
            self.repo.save_messages(&replacement.id, &[])?;
            remaining.push(replacement);
        }
        self.repo.save_sessions(&remaining)?;

        self.sessions = remaining;
        self.retired.insert(id.to_string());
        tracing::debug!("Deleted session {}", id);

        if self.active_id == id {
            // the pointer moves in memory before any further write can fail
            let next = self
                .sessions
                .first()
                .map(|s| s.id.clone())
                .ok_or_else(|| BotchatError::Storage("no session left to activate".into()))?;
            self.active_id = next.clone();
            self.messages.clear();
            self.messages = self.repo.load_messages(&next)?;
            self.repo.save_active(&next)?;
        }
        self.repo.delete_messages(id)
    }

    /// Append to a session's log and persist it immediately
    ///
    /// # Errors
    ///
    /// Returns `BotchatError::SessionNotFound` for an unknown id
    pub fn append_message(&mut self, session_id: &str, message: ChatMessage) -> Result<()> {
        if session_id == self.active_id {
            self.messages.push(message);
            if let Err(e) = self.repo.save_messages(session_id, &self.messages) {
                self.messages.pop();
                return Err(e);
            }
            return Ok(());
        }
        if !self.contains(session_id) {
            return Err(BotchatError::SessionNotFound(session_id.to_string()).into());
        }
        let mut log = self.repo.load_messages(session_id)?;
        log.push(message);
        self.repo.save_messages(session_id, &log)
    }

    /// Replace the visible text of a streaming placeholder, in memory only
    ///
    /// Only the active session's last bot message is touched.
    pub fn set_last_message_text(&mut self, session_id: &str, text: &str) {
        if session_id != self.active_id {
            return;
        }
        if let Some(last) = self.messages.last_mut() {
            if last.sender == Sender::Bot {
                last.text = text.to_string();
            }
        }
    }

    /// Write a streaming placeholder's final text and persist the log
    ///
    /// If the session's last message is not a bot message, the text is
    /// appended as a new bot message instead.
    ///
    /// # Errors
    ///
    /// Returns `BotchatError::SessionNotFound` for an unknown id
    pub fn finalize_last_message(&mut self, session_id: &str, text: &str) -> Result<()> {
        if !self.contains(session_id) {
            return Err(BotchatError::SessionNotFound(session_id.to_string()).into());
        }

        let finalize = |log: &mut Vec<ChatMessage>| {
            match log.last_mut() {
                Some(last) if last.sender == Sender::Bot => {
                    last.text = text.to_string();
                    return;
                }
                _ => {}
            }
            log.push(ChatMessage::bot(text));
        };

        if session_id == self.active_id {
            finalize(&mut self.messages);
            self.repo.save_messages(session_id, &self.messages)
        } else {
            let mut log = self.repo.load_messages(session_id)?;
            finalize(&mut log);
            self.repo.save_messages(session_id, &log)
        }
    }

    /// Apply a generated title only while the title is still the default
    ///
    /// # Returns
    ///
    /// Returns true when the title was applied. An unknown id (for example a
    /// session deleted while its title was being generated) returns false.
    pub fn rename_session_if_default(&mut self, id: &str, title: &str) -> Result<bool> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(false);
        }
        match self.sessions.iter_mut().find(|s| s.id == id) {
            Some(session) if session.has_default_title() => {
                session.title = title.to_string();
                self.repo.save_sessions(&self.sessions)?;
                tracing::debug!("Titled session {}: {}", id, title);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                tracing::debug!("Discarding title for missing session {}", id);
                Ok(false)
            }
        }
    }

    /// Rename a session unconditionally
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title, or
    /// `BotchatError::SessionNotFound` for an unknown id
    pub fn rename_session(&mut self, id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(BotchatError::Validation("Title cannot be empty".to_string()).into());
        }
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| BotchatError::SessionNotFound(id.to_string()))?;
        session.title = title.to_string();
        self.repo.save_sessions(&self.sessions)
    }

    /// Empty the active session's log
    pub fn clear_messages(&mut self) -> Result<()> {
        self.messages.clear();
        self.repo.save_messages(&self.active_id, &[])
    }

    /// Sessions in listing order (newest first)
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.session(&self.active_id)
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// The active session's log
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Any session's log
    ///
    /// # Errors
    ///
    /// Returns `BotchatError::SessionNotFound` for an unknown id
    pub fn messages_for(&self, id: &str) -> Result<Vec<ChatMessage>> {
        if id == self.active_id {
            return Ok(self.messages.clone());
        }
        if !self.contains(id) {
            return Err(BotchatError::SessionNotFound(id.to_string()).into());
        }
        self.repo.load_messages(id)
    }

    /// Resolve a full id or an unambiguous id prefix
    ///
    /// # Errors
    ///
    /// Returns `BotchatError::SessionNotFound` when nothing matches, or a
    /// validation error when the prefix matches several sessions
    pub fn resolve_id(&self, id_or_prefix: &str) -> Result<String> {
        let needle = id_or_prefix.trim();
        if self.contains(needle) {
            return Ok(needle.to_string());
        }
        let matches: Vec<&Session> = if needle.is_empty() {
            Vec::new()
        } else {
            self.sessions
                .iter()
                .filter(|s| s.id.starts_with(needle))
                .collect()
        };
        match matches.as_slice() {
            [] => Err(BotchatError::SessionNotFound(needle.to_string()).into()),
            [one] => Ok(one.id.clone()),
            _ => Err(BotchatError::Validation(format!(
                "Session id prefix '{}' is ambiguous ({} matches)",
                needle,
                matches.len()
            ))
            .into()),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.sessions.iter().any(|s| s.id == id)
    }

    fn activate(&mut self, id: &str) -> Result<()> {
        let messages = self.repo.load_messages(id)?;
        self.active_id = id.to_string();
        self.repo.save_active(id)?;
        self.messages = messages;
        Ok(())
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.contains(&id) && !self.retired.contains(&id) {
                return id;
            }
        }
    }
}

/// Title shown for a session in listings
pub fn display_title(session: &Session) -> &str {
    if session.title.trim().is_empty() {
        DEFAULT_SESSION_TITLE
    } else {
        &session.title
    }
}
