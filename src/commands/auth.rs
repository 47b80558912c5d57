//! `auth` command: store a provider API key in the OS keyring

use crate::config::KNOWN_PROVIDERS;
use crate::error::{BotchatError, Result};
use crate::providers::{provider_name, store_api_key};
use colored::Colorize;
use rustyline::DefaultEditor;

/// Check that `provider` is one Botchat can use
///
/// # Errors
///
/// Returns `BotchatError::Validation` for an unknown provider id
pub fn check_provider(provider: &str) -> Result<()> {
    if KNOWN_PROVIDERS.contains(&provider) {
        Ok(())
    } else {
        Err(BotchatError::Validation(format!(
            "Unsupported provider: {}. Must be one of: {}",
            provider,
            KNOWN_PROVIDERS.join(", ")
        ))
        .into())
    }
}

/// Prompt for an API key and store it for `provider`
///
/// # Errors
///
/// Returns error for an unknown provider, an empty key, or a keyring failure
pub fn authenticate(provider: &str) -> Result<()> {
    check_provider(provider)?;
    tracing::info!("Storing API key for provider: {}", provider);

    let mut rl = DefaultEditor::new()?;
    let key = rl.readline(&format!("{} API key: ", provider_name(provider)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(BotchatError::Validation("API key cannot be empty".to_string()).into());
    }

    store_api_key(provider, key)?;
    println!(
        "{} {} key stored in the system keyring",
        "✓".green(),
        provider_name(provider)
    );
    Ok(())
}
