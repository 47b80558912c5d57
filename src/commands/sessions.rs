//! Session management commands
//!
//! Listing, switching, renaming, exporting, and inspecting stored sessions.
//! Ids may be abbreviated to any unambiguous prefix.

use crate::cli::SessionCommand;
use crate::controller::ConversationController;
use crate::error::Result;
use crate::export::{
    conversation_stats, conversation_summary, default_export_filename, export_conversation,
    format_relative_time, ExportFormat,
};
use crate::session::display_title;
use crate::storage::{ChatMessage, Sender, Session};
use chrono::Utc;
use colored::Colorize;
use prettytable::{row, Table};
use std::path::{Path, PathBuf};

/// Characters of a session id shown in listings
pub const SHORT_ID_LEN: usize = 8;

/// Abbreviated session id for display
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Dispatch a `sessions` subcommand
///
/// # Errors
///
/// Returns error if a session cannot be found or storage fails
pub async fn handle_sessions(
    controller: &ConversationController,
    command: SessionCommand,
) -> Result<()> {
    match command {
        SessionCommand::List => {
            let sessions = controller.sessions()?;
            let active = controller.active_session()?;
            print_sessions_table(&sessions, &active.id);
        }
        SessionCommand::New { title } => {
            let session = controller.create_session(title.as_deref())?;
            println!(
                "Created session {} ({})",
                short_id(&session.id).cyan(),
                display_title(&session)
            );
        }
        SessionCommand::Switch { id } => {
            let session = controller.switch_session(&id)?;
            println!(
                "Switched to {} ({})",
                short_id(&session.id).cyan(),
                display_title(&session)
            );
        }
        SessionCommand::Delete { id } => {
            let deleted = controller.delete_session(&id).await?;
            println!("Deleted session {}", short_id(&deleted).cyan());
        }
        SessionCommand::Rename { id, title } => {
            controller.rename_session(&id, &title)?;
            println!("Renamed session to {}", title.bold());
        }
        SessionCommand::Show { id } => {
            let messages = messages_for(controller, id.as_deref())?;
            print_transcript(&messages);
        }
        SessionCommand::Export { id, format, output } => {
            let format: ExportFormat = format.parse()?;
            let messages = messages_for(controller, id.as_deref())?;
            let path = write_export(&messages, format, output.as_deref())?;
            println!("Exported {} messages to {}", messages.len(), path.display());
        }
        SessionCommand::Stats { id } => {
            let messages = messages_for(controller, id.as_deref())?;
            print_stats(&messages);
        }
    }
    Ok(())
}

fn messages_for(controller: &ConversationController, id: Option<&str>) -> Result<Vec<ChatMessage>> {
    match id {
        Some(id) => controller.messages_for(id),
        None => controller.messages(),
    }
}

/// Render and write an export, returning the path written
///
/// # Errors
///
/// Returns error for an empty conversation or a failed write
pub fn write_export(
    messages: &[ChatMessage],
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<PathBuf> {
    let rendered = export_conversation(messages, format)?;
    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(default_export_filename(format, Utc::now().date_naive())));
    std::fs::write(&path, rendered)?;
    tracing::info!("Exported conversation to {}", path.display());
    Ok(path)
}

/// Print sessions as a table, marking the active one
pub fn print_sessions_table(sessions: &[Session], active_id: &str) {
    let now = Utc::now();
    let mut table = Table::new();
    table.add_row(row!["", "ID", "Title", "Created"]);
    for session in sessions {
        table.add_row(row![
            if session.id == active_id { "*" } else { "" },
            short_id(&session.id),
            display_title(session),
            format_relative_time(session.created, now)
        ]);
    }
    println!();
    table.printstd();
    println!();
}

/// Print a conversation with colored speaker labels
pub fn print_transcript(messages: &[ChatMessage]) {
    if messages.is_empty() {
        println!("{}", "No messages yet.".dimmed());
        return;
    }
    for message in messages {
        let label = match message.sender {
            Sender::User => "You".green().bold(),
            Sender::Bot => "AI".blue().bold(),
        };
        println!("{}: {}\n", label, message.text);
    }
}

/// Print message counts and timing
pub fn print_stats(messages: &[ChatMessage]) {
    let stats = conversation_stats(messages);
    println!("{}", conversation_summary(messages));
    println!("Average length: {} characters", stats.average_length);
    if let (Some(first), Some(last)) = (stats.first, stats.last) {
        println!(
            "First: {}  Last: {}",
            first.format("%Y-%m-%d %H:%M"),
            last.format("%Y-%m-%d %H:%M")
        );
    }
}
