//! Special commands parser for interactive chat mode
//!
//! Lines starting with `/` are parsed into [`SpecialCommand`]s instead of
//! being sent to the model. Command words are case-insensitive; arguments
//! such as titles and search queries keep their original case.

use crate::export::ExportFormat;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a new session, optionally titled
    NewSession(Option<String>),

    /// List sessions
    ListSessions,

    /// Make another session active
    SwitchSession(String),

    /// Delete a session
    DeleteSession(String),

    /// Rename the active session
    Rename(String),

    /// Use a different model for the rest of the chat
    SwitchModel(String),

    /// List the model catalog
    ListModels,

    /// Export the active conversation
    Export {
        format: ExportFormat,
        path: Option<PathBuf>,
    },

    /// Search the active conversation
    Search(String),

    /// Show conversation statistics
    Stats,

    /// Remove every message from the active session
    Clear,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command
    ///
    /// The input should be sent as a chat message.
    None,
}

fn required(command: &str, usage: &str, rest: &str) -> Result<String, CommandError> {
    if rest.is_empty() {
        Err(CommandError::MissingArgument {
            command: command.to_string(),
            usage: usage.to_string(),
        })
    } else {
        Ok(rest.to_string())
    }
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognized `/word`,
/// `CommandError::MissingArgument` when a required argument is absent, and
/// `CommandError::UnsupportedArgument` for an invalid argument.
///
/// # Examples
///
/// ```
/// use botchat::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// let cmd = parse_special_command("/switch 3f2a").unwrap();
/// assert_eq!(cmd, SpecialCommand::SwitchSession("3f2a".to_string()));
///
/// let cmd = parse_special_command("hello there").unwrap();
/// assert_eq!(cmd, SpecialCommand::None);
///
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(SpecialCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match word.as_str() {
        "/new" => Ok(SpecialCommand::NewSession(
            (!rest.is_empty()).then(|| rest.to_string()),
        )),
        "/sessions" => Ok(SpecialCommand::ListSessions),
        "/switch" => required("/switch", "/switch <session-id>", rest)
            .map(SpecialCommand::SwitchSession),
        "/delete" => required("/delete", "/delete <session-id>", rest)
            .map(SpecialCommand::DeleteSession),
        "/rename" => required("/rename", "/rename <title>", rest).map(SpecialCommand::Rename),
        "/model" => required("/model", "/model <model-id>", rest).map(SpecialCommand::SwitchModel),
        "/models" => Ok(SpecialCommand::ListModels),
        "/export" => {
            let mut parts = rest.split_whitespace();
            let format = match parts.next() {
                Some(f) => f.parse::<ExportFormat>().map_err(|_| {
                    CommandError::UnsupportedArgument {
                        command: "/export".to_string(),
                        arg: f.to_string(),
                    }
                })?,
                None => {
                    return Err(CommandError::MissingArgument {
                        command: "/export".to_string(),
                        usage: "/export <json|txt|md> [path]".to_string(),
                    })
                }
            };
            let path = parts.next().map(PathBuf::from);
            Ok(SpecialCommand::Export { format, path })
        }
        "/search" => required("/search", "/search <query>", rest).map(SpecialCommand::Search),
        "/stats" => Ok(SpecialCommand::Stats),
        "/clear" => Ok(SpecialCommand::Clear),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

/// Display help text for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat Mode
===========================================

SESSIONS:
  /new [title]       - Start a new session
  /sessions          - List sessions
  /switch <id>       - Switch to a session (id prefix is enough)
  /delete <id>       - Delete a session
  /rename <title>    - Rename the active session
  /clear             - Remove all messages from the active session

MODELS:
  /models            - List available models
  /model <id>        - Use a model (catalog value or provider:model)

CONVERSATION:
  /export <json|txt|md> [path] - Export the conversation
  /search <query>    - Find messages containing text
  /stats             - Show message counts

OTHER:
  /help              - Show this help
  /exit              - Leave the chat (also: exit, quit)

Press Ctrl-C while a reply is streaming to cancel it.
"#
    );
}
