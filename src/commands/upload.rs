//! Document upload command
//!
//! Reads a plain text file, chunks it, and indexes the chunks for retrieval
//! under a session.

use crate::controller::ConversationController;
use crate::error::{BotchatError, Result};
use colored::Colorize;
use std::path::Path;

/// File extensions accepted for upload
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["txt", "md", "csv", "json", "log"];

/// Check that a path names a supported plain text file
///
/// # Errors
///
/// Returns `BotchatError::Validation` for any other extension
pub fn check_extension(path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(BotchatError::Validation(format!(
            "Unsupported file type '{}'. Supported: {}",
            path.display(),
            ALLOWED_EXTENSIONS
                .iter()
                .map(|e| format!(".{}", e))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .into())
    }
}

/// Upload a file, returning how many chunks were indexed
///
/// # Arguments
///
/// * `controller` - Controller holding the retrieval client
/// * `path` - File to read
/// * `session` - Session id or prefix; the active session when `None`
///
/// # Errors
///
/// Returns error for an unsupported or unreadable file, an empty document,
/// or when retrieval is not configured
pub async fn upload_file(
    controller: &ConversationController,
    path: &Path,
    session: Option<&str>,
) -> Result<usize> {
    check_extension(path)?;
    let text = std::fs::read_to_string(path)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();

    tracing::info!("Uploading {} ({} bytes)", file_name, text.len());
    let count = controller.ingest(&text, &file_name, session).await?;
    println!(
        "{} {} ({} chunks indexed)",
        "Uploaded".green(),
        file_name,
        count
    );
    Ok(count)
}
