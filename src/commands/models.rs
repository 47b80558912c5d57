//! Model management commands for Botchat
//!
//! Lists the model catalog: built-in entries plus any `provider.extra_models`
//! from configuration.

use crate::config::Config;
use crate::error::{BotchatError, Result};
use crate::providers::{provider_name, ModelOption, ProviderRegistry};
use prettytable::{row, Table};
use serde::Serialize;

/// One catalog row as printed by `models list`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelListing {
    pub name: String,
    pub value: String,
    pub provider: String,
    pub default: bool,
}

/// List available models
///
/// # Arguments
///
/// * `config` - Configuration containing provider settings
/// * `provider_filter` - Only show models served by this provider id
/// * `json` - Print JSON instead of a table
///
/// # Errors
///
/// Returns error for an unknown provider filter or a serialization failure
///
/// # Examples
///
/// ```no_run
/// use botchat::config::Config;
/// use botchat::commands::models::list_models;
///
/// # fn example() -> anyhow::Result<()> {
/// list_models(&Config::default(), Some("together"), false)?;
/// # Ok(())
/// # }
/// ```
pub fn list_models(config: &Config, provider_filter: Option<&str>, json: bool) -> Result<()> {
    let registry = ProviderRegistry::from_config(&config.provider)?;
    let listings = collect_listings(registry.catalog(), registry.default_model(), provider_filter)?;
    tracing::debug!("Listing {} models", listings.len());

    if json {
        let rendered =
            serde_json::to_string_pretty(&listings).map_err(BotchatError::Serialization)?;
        println!("{}", rendered);
    } else {
        output_models_table(&listings);
    }
    Ok(())
}

/// Filter the catalog and mark the default model
///
/// # Errors
///
/// Returns `BotchatError::Validation` when the filter names no known provider
pub fn collect_listings(
    catalog: &[ModelOption],
    default_model: &str,
    provider_filter: Option<&str>,
) -> Result<Vec<ModelListing>> {
    if let Some(filter) = provider_filter {
        if !catalog.iter().any(|m| m.provider == filter) {
            return Err(BotchatError::Validation(format!(
                "No models for provider '{}'",
                filter
            ))
            .into());
        }
    }

    Ok(catalog
        .iter()
        .filter(|m| provider_filter.map_or(true, |p| m.provider == p))
        .map(|m| ModelListing {
            name: m.name.clone(),
            value: m.value.clone(),
            provider: m.provider.clone(),
            default: m.value == default_model,
        })
        .collect())
}

fn output_models_table(listings: &[ModelListing]) {
    let mut table = Table::new();
    table.add_row(row!["Model", "Identifier", "Provider", ""]);
    for model in listings {
        table.add_row(row![
            model.name,
            model.value,
            provider_name(&model.provider),
            if model.default { "default" } else { "" }
        ]);
    }
    println!("\nAvailable models:\n");
    table.printstd();
    println!();
}
