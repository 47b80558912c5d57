//! Session persistence on an embedded `sled` tree
//!
//! Layout: `sessions` holds the JSON index, `active` holds the active
//! session id, and `messages/{id}` holds each session's JSON message log.
//! Every write is flushed before returning.

use crate::error::{BotchatError, Result};
use crate::storage::types::{decode_messages, encode_messages, ChatMessage, Session};
use crate::storage::SessionRepository;
use sled::Db;
use std::path::Path;

const SESSIONS_KEY: &str = "sessions";
const ACTIVE_KEY: &str = "active";

fn messages_key(session_id: &str) -> String {
    format!("messages/{}", session_id)
}

/// Session repository backed by `sled`
pub struct SledSessionRepository {
    db: Db,
}

impl SledSessionRepository {
    /// Open or create a repository
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the database directory
    ///
    /// # Errors
    ///
    /// Returns `BotchatError::Storage` if database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use botchat::storage::{SessionRepository, SledSessionRepository};
    ///
    /// # fn main() -> botchat::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let repo = SledSessionRepository::new(dir.path().join("sessions.sled"))?;
    /// assert!(repo.load_sessions()?.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| BotchatError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| BotchatError::Storage(format!("Insert failed: {}", e)))?;
        self.flush()
    }

    fn get(&self, key: &str) -> Result<Option<sled::IVec>> {
        self.db
            .get(key.as_bytes())
            .map_err(|e| BotchatError::Storage(format!("Get failed: {}", e)).into())
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| BotchatError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

impl SessionRepository for SledSessionRepository {
    fn load_sessions(&self) -> Result<Vec<Session>> {
        match self.get(SESSIONS_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                BotchatError::Storage(format!("Deserialization failed: {}", e)).into()
            }),
            None => Ok(Vec::new()),
        }
    }

    fn save_sessions(&self, sessions: &[Session]) -> Result<()> {
        let value = serde_json::to_vec(sessions)
            .map_err(|e| BotchatError::Storage(format!("Serialization failed: {}", e)))?;
        self.put(SESSIONS_KEY, value)
    }

    fn load_active(&self) -> Result<Option<String>> {
        Ok(self
            .get(ACTIVE_KEY)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn save_active(&self, session_id: &str) -> Result<()> {
        self.put(ACTIVE_KEY, session_id.as_bytes().to_vec())
    }

    fn load_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        match self.get(&messages_key(session_id))? {
            Some(bytes) => decode_messages(&bytes).map_err(|e| {
                BotchatError::Storage(format!("Deserialization failed: {}", e)).into()
            }),
            None => Ok(Vec::new()),
        }
    }

    fn save_messages(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
        let value = encode_messages(messages)
            .map_err(|e| BotchatError::Storage(format!("Serialization failed: {}", e)))?;
        self.put(&messages_key(session_id), value)
    }

    fn delete_messages(&self, session_id: &str) -> Result<()> {
        self.db
            .remove(messages_key(session_id).as_bytes())
            .map_err(|e| BotchatError::Storage(format!("Remove failed: {}", e)))?;
        self.flush()
    }
}
