//! Botchat - multi-provider LLM chat library
//!
//! This library provides the core of Botchat: provider adapters for OpenAI
//! and Together.ai, a response orchestrator with framed streaming, durable
//! chat sessions, and retrieval-augmented prompts over uploaded documents.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `providers`: Provider trait, model catalog, registry, and adapters
//! - `orchestrator`: Model resolution and streamed reply framing
//! - `controller`: Turn lifecycle over the session store
//! - `session` / `storage`: Session index, message logs, and backends
//! - `retrieval` / `chunker`: Document chunking, indexing, and search
//! - `memory` / `title`: History shaping and title generation
//! - `server`: HTTP Turn API
//! - `config` / `error` / `cli`: Configuration, error types, and the CLI
//!
//! # Example
//!
//! ```no_run
//! use botchat::{Config, ConversationController, TurnOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("botchat.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let controller = ConversationController::from_config(&config)?;
//!     if let Some(reply) = controller
//!         .send_turn("Hello!", &TurnOptions::default())
//!         .await?
//!     {
//!         println!("{}", reply.text);
//!     }
//!     Ok(())
//! }
//! ```

pub mod chunker;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod memory;
pub mod orchestrator;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod session;
pub mod storage;
pub mod title;

// Re-export commonly used types
pub use config::Config;
pub use controller::{ConversationController, TurnOptions, TurnReply};
pub use error::{BotchatError, Result};
pub use orchestrator::{Orchestrator, StreamEvent};
pub use providers::{Provider, ProviderRegistry};
pub use session::SessionStore;

#[cfg(test)]
pub mod test_utils;
