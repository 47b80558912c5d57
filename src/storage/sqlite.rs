//! Session persistence in a SQLite file

use crate::error::{BotchatError, Result};
use crate::storage::types::{decode_messages, encode_messages, ChatMessage, Session};
use crate::storage::SessionRepository;
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

/// Session repository backed by SQLite
pub struct SqliteSessionRepository {
    db_path: PathBuf,
}

impl SqliteSessionRepository {
    /// Create a repository that uses the specified database path.
    ///
    /// Parent directories are created when missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use botchat::storage::SqliteSessionRepository;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let repo = SqliteSessionRepository::new_with_path(dir.path().join("sessions.db")).unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| BotchatError::Storage(e.to_string()))?;
        }

        let repo = Self { db_path };
        repo.init()?;
        Ok(repo)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| BotchatError::Storage(e.to_string()).into())
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                position INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS session_messages (
                session_id TEXT PRIMARY KEY,
                messages JSON NOT NULL
            );
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .context("Failed to create tables")
        .map_err(|e| BotchatError::Storage(e.to_string()))?;
        Ok(())
    }
}

impl SessionRepository for SqliteSessionRepository {
    fn load_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare("SELECT id, title, created_at FROM sessions ORDER BY position ASC")
            .context("Failed to prepare statement")
            .map_err(|e| BotchatError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let title: String = row.get(1)?;
                let created_str: String = row.get(2)?;
                let created = DateTime::parse_from_rfc3339(&created_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                Ok(Session { id, title, created })
            })
            .context("Failed to query sessions")
            .map_err(|e| BotchatError::Storage(e.to_string()))?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(
                row.context("Failed to read session row")
                    .map_err(|e| BotchatError::Storage(e.to_string()))?,
            );
        }
        Ok(sessions)
    }

    fn save_sessions(&self, sessions: &[Session]) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| BotchatError::Storage(e.to_string()))?;

        tx.execute("DELETE FROM sessions", [])
            .context("Failed to clear session index")
            .map_err(|e| BotchatError::Storage(e.to_string()))?;

        for (position, session) in sessions.iter().enumerate() {
            tx.execute(
                "INSERT INTO sessions (id, title, created_at, position) VALUES (?, ?, ?, ?)",
                params![
                    session.id,
                    session.title,
                    session.created.to_rfc3339(),
                    position as i64
                ],
            )
            .context("Failed to insert session")
            .map_err(|e| BotchatError::Storage(e.to_string()))?;
        }

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| BotchatError::Storage(e.to_string()))?;
        Ok(())
    }

    fn load_active(&self) -> Result<Option<String>> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT value FROM meta WHERE key = 'active'",
            [],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query active session")
        .map_err(|e| BotchatError::Storage(e.to_string()).into())
    }

    fn save_active(&self, session_id: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('active', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![session_id],
        )
        .context("Failed to save active session")
        .map_err(|e| BotchatError::Storage(e.to_string()))?;
        Ok(())
    }

    fn load_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let conn = self.open()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT messages FROM session_messages WHERE session_id = ?",
                params![session_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query messages")
            .map_err(|e| BotchatError::Storage(e.to_string()))?;

        match json {
            Some(json) => decode_messages(json.as_bytes())
                .context("Failed to deserialize messages")
                .map_err(|e| BotchatError::Storage(e.to_string()).into()),
            None => Ok(Vec::new()),
        }
    }

    fn save_messages(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
        let bytes = encode_messages(messages)
            .context("Failed to serialize messages")
            .map_err(|e| BotchatError::Storage(e.to_string()))?;
        let json = String::from_utf8(bytes)
            .context("Serialized messages are not UTF-8")
            .map_err(|e| BotchatError::Storage(e.to_string()))?;

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO session_messages (session_id, messages) VALUES (?, ?)
             ON CONFLICT(session_id) DO UPDATE SET messages = excluded.messages",
            params![session_id, json],
        )
        .context("Failed to save messages")
        .map_err(|e| BotchatError::Storage(e.to_string()))?;
        Ok(())
    }

    fn delete_messages(&self, session_id: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM session_messages WHERE session_id = ?",
            params![session_id],
        )
        .context("Failed to delete messages")
        .map_err(|e| BotchatError::Storage(e.to_string()))?;
        Ok(())
    }
}
