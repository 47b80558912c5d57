//! Durable session storage
//!
//! The [`SessionRepository`] trait is the persistence seam used by the
//! session store: a session index, an active-session pointer, and one
//! message log per session. Backends are an embedded `sled` tree, a SQLite
//! file, and an in-memory map for tests and ephemeral runs.

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{BotchatError, Result};
use directories::ProjectDirs;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub mod sled_store;
pub mod sqlite;
pub mod types;

pub use sled_store::SledSessionRepository;
pub use sqlite::SqliteSessionRepository;
pub use types::{ChatMessage, Sender, Session, StoredMessage, DEFAULT_SESSION_TITLE};

/// Persistence operations required by the session store
///
/// Every write is expected to be durable when the call returns.
pub trait SessionRepository: Send + Sync {
    /// Load the session index in listing order
    fn load_sessions(&self) -> Result<Vec<Session>>;

    /// Replace the session index
    fn save_sessions(&self, sessions: &[Session]) -> Result<()>;

    /// Load the active-session pointer, if one was saved
    fn load_active(&self) -> Result<Option<String>>;

    /// Persist the active-session pointer
    fn save_active(&self, session_id: &str) -> Result<()>;

    /// Load one session's message log (empty when none was saved)
    fn load_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>>;

    /// Replace one session's message log
    fn save_messages(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()>;

    /// Remove one session's message log
    fn delete_messages(&self, session_id: &str) -> Result<()>;
}

/// In-memory repository; nothing survives the process
#[derive(Debug, Default)]
pub struct MemorySessionRepository {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    sessions: Vec<Session>,
    active: Option<String>,
    logs: HashMap<String, Vec<ChatMessage>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.inner
            .lock()
            .map_err(|_| BotchatError::Storage("Memory repository lock poisoned".into()).into())
    }
}

impl SessionRepository for MemorySessionRepository {
    fn load_sessions(&self) -> Result<Vec<Session>> {
        Ok(self.state()?.sessions.clone())
    }

    fn save_sessions(&self, sessions: &[Session]) -> Result<()> {
        self.state()?.sessions = sessions.to_vec();
        Ok(())
    }

    fn load_active(&self) -> Result<Option<String>> {
        Ok(self.state()?.active.clone())
    }

    fn save_active(&self, session_id: &str) -> Result<()> {
        self.state()?.active = Some(session_id.to_string());
        Ok(())
    }

    fn load_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .state()?
            .logs
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_messages(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
        self.state()?
            .logs
            .insert(session_id.to_string(), messages.to_vec());
        Ok(())
    }

    fn delete_messages(&self, session_id: &str) -> Result<()> {
        self.state()?.logs.remove(session_id);
        Ok(())
    }
}

/// Default data directory for persisted sessions
pub fn default_data_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("dev", "botchat", "botchat")
        .ok_or_else(|| BotchatError::Storage("Could not determine data directory".into()))?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

/// Open the repository selected by configuration
///
/// # Errors
///
/// Returns `BotchatError::Storage` if the backing store cannot be opened
pub fn open_repository(config: &StorageConfig) -> Result<Arc<dyn SessionRepository>> {
    let base = match &config.path {
        Some(path) => PathBuf::from(path),
        None => default_data_dir()?,
    };

    let repo: Arc<dyn SessionRepository> = match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory session storage");
            Arc::new(MemorySessionRepository::new())
        }
        StorageBackend::Sled => {
            let path = base.join("sessions.sled");
            tracing::info!("Opening sled session storage at {}", path.display());
            Arc::new(SledSessionRepository::new(path)?)
        }
        StorageBackend::Sqlite => {
            let path = if base.extension().is_some() {
                base
            } else {
                base.join("sessions.db")
            };
            tracing::info!("Opening SQLite session storage at {}", path.display());
            Arc::new(SqliteSessionRepository::new_with_path(path)?)
        }
    };
    Ok(repo)
}
