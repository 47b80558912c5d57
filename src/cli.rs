//! Command-line interface definition for Botchat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for chatting, session management, document upload,
//! and serving the Turn API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Botchat - multi-provider LLM chat
///
/// Chat with OpenAI or Together models from the terminal, keep named
/// sessions, and ground answers in uploaded documents.
#[derive(Parser, Debug, Clone)]
#[command(name = "botchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "BOTCHAT_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the session storage location
    #[arg(long)]
    pub storage_path: Option<String>,

    /// Keep sessions in memory only
    #[arg(long)]
    pub ephemeral: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Botchat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat
    Chat {
        /// Model identifier (catalog value or provider:model)
        #[arg(short, long)]
        model: Option<String>,

        /// Session to resume (id or unambiguous prefix)
        #[arg(short, long)]
        session: Option<String>,

        /// Wait for whole replies instead of streaming
        #[arg(long)]
        no_stream: bool,

        /// Skip document retrieval for this run
        #[arg(long)]
        no_rag: bool,
    },

    /// Send one message to the active session
    Ask {
        /// Message text
        message: String,

        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        no_stream: bool,

        #[arg(long)]
        no_rag: bool,
    },

    /// Manage chat sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Manage AI models
    Models {
        #[command(subcommand)]
        command: ModelCommand,
    },

    /// Chunk a text document and index it for retrieval
    Upload {
        /// Path to a plain text file
        file: PathBuf,

        /// Session the document belongs to (defaults to the active one)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Serve the Turn API over HTTP
    Serve {
        /// Address to bind, e.g. 127.0.0.1:3000
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Store an API key for a provider in the OS keyring
    Auth {
        /// Provider id (openai, together)
        provider: String,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List sessions, newest first
    List,

    /// Create a session and make it active
    New {
        /// Initial title
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Make a session active
    Switch { id: String },

    /// Delete a session and its messages
    Delete { id: String },

    /// Rename a session
    Rename { id: String, title: String },

    /// Print a session's messages
    Show {
        /// Session id; defaults to the active session
        id: Option<String>,
    },

    /// Export a session's messages
    Export {
        /// Session id; defaults to the active session
        id: Option<String>,

        /// Output format (json, txt, md)
        #[arg(short, long, default_value = "md")]
        format: String,

        /// Output file; defaults to conversation-YYYY-MM-DD.<ext>
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show message counts for a session
    Stats { id: Option<String> },
}

/// Model management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ModelCommand {
    /// List available models
    List {
        /// Filter by provider (openai, together)
        #[arg(short, long)]
        provider: Option<String>,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: None,
            verbose: false,
            json_logs: false,
            storage_path: None,
            ephemeral: false,
            command: Commands::Serve { bind: None },
        }
    }
}
