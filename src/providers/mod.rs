//! Provider module for Botchat
//!
//! This module contains the LLM provider abstraction, the OpenAI and
//! Together implementations, the model catalog, and the registry that maps
//! model identifiers to providers.

pub mod base;
pub mod catalog;
pub mod openai;
pub mod sse;
pub mod together;

pub use base::{
    build_request_messages, history_to_messages, FragmentStream, Message, Provider,
    ProviderCapabilities, TextStream,
};
pub use catalog::{builtin_models, provider_name, ModelOption, ProviderOption, PROVIDERS};
pub use openai::{OpenAiProvider, OPENAI_ID};
pub use together::{TogetherProvider, TOGETHER_ID};

use crate::config::ProviderConfig;
use crate::error::{BotchatError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Keyring service name for stored API keys
pub const KEYRING_SERVICE: &str = "botchat";

/// Resolve an API key: configured value first, then the OS keyring
///
/// Keyring failures (no backend, no entry) are treated as "no key".
pub fn resolve_api_key(configured: Option<String>, provider_id: &str) -> Option<String> {
    if let Some(key) = configured.filter(|k| !k.is_empty()) {
        return Some(key);
    }
    match keyring::Entry::new(KEYRING_SERVICE, provider_id).and_then(|e| e.get_password()) {
        Ok(key) if !key.is_empty() => {
            tracing::debug!("Using {} API key from keyring", provider_id);
            Some(key)
        }
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("No {} API key in keyring: {}", provider_id, e);
            None
        }
    }
}

/// Store an API key in the OS keyring
///
/// # Errors
///
/// Returns `BotchatError::Keyring` if the keyring is unavailable
pub fn store_api_key(provider_id: &str, key: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, provider_id).map_err(BotchatError::Keyring)?;
    entry.set_password(key).map_err(BotchatError::Keyring)?;
    Ok(())
}

/// A model identifier resolved to the provider that serves it
#[derive(Clone)]
pub struct ResolvedModel {
    pub provider: Arc<dyn Provider>,
    pub model: String,
    /// True when the requested identifier was unknown and defaults were used
    pub fell_back: bool,
}

impl std::fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("provider", &self.provider.id())
            .field("model", &self.model)
            .field("fell_back", &self.fell_back)
            .finish()
    }
}

/// Mapping from provider id to provider instance, built once at startup
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    catalog: Vec<ModelOption>,
    default_provider: String,
    default_model: String,
}

impl ProviderRegistry {
    /// Create an empty registry with the built-in catalog
    pub fn new(default_provider: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            catalog: builtin_models(),
            default_provider: default_provider.into(),
            default_model: default_model.into(),
        }
    }

    /// Build the registry from configuration, registering every known vendor
    ///
    /// # Errors
    ///
    /// Returns error if a provider's HTTP client cannot be created
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let mut registry = Self::new(&config.default_provider, &config.default_model);
        registry.extend_catalog(config.extra_models.iter().cloned());
        registry.register(Arc::new(OpenAiProvider::new(config.openai.clone())?));
        registry.register(Arc::new(TogetherProvider::new(config.together.clone())?));
        Ok(registry)
    }

    /// Register (or replace) a provider under its id
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        tracing::debug!("Registering provider: {}", provider.id());
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Add catalog entries; an entry with an existing value replaces it
    pub fn extend_catalog(&mut self, models: impl IntoIterator<Item = ModelOption>) {
        for model in models {
            if let Some(existing) = self.catalog.iter_mut().find(|m| m.value == model.value) {
                *existing = model;
            } else {
                self.catalog.push(model);
            }
        }
    }

    /// Look up a provider by id
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Registered provider ids, sorted
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Catalog of selectable models
    pub fn catalog(&self) -> &[ModelOption] {
        &self.catalog
    }

    /// Model used when an identifier cannot be resolved
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Resolve a model identifier to exactly one provider
    ///
    /// Accepts a catalog value (`gpt-4o-mini`) or an explicit
    /// `provider:model` pair (`openai:gpt-4o`). Anything else, including a
    /// catalog model whose provider is not registered, falls back to the
    /// default provider and model.
    ///
    /// # Errors
    ///
    /// Returns `BotchatError::Config` only when the default provider itself
    /// is not registered
    pub fn resolve(&self, model_id: Option<&str>) -> Result<ResolvedModel> {
        let requested = model_id.map(str::trim).filter(|m| !m.is_empty());

        if let Some(requested) = requested {
            if let Some(entry) = self.catalog.iter().find(|m| m.value == requested) {
                if let Some(provider) = self.get(&entry.provider) {
                    return Ok(ResolvedModel {
                        provider,
                        model: entry.value.clone(),
                        fell_back: false,
                    });
                }
            }

            if let Some((provider_id, model)) = requested.split_once(':') {
                if let Some(provider) = self.get(provider_id) {
                    if !model.is_empty() {
                        return Ok(ResolvedModel {
                            provider,
                            model: model.to_string(),
                            fell_back: false,
                        });
                    }
                }
            }

            tracing::warn!(
                "Model '{}' is not served by a registered provider; falling back to {}:{}",
                requested,
                self.default_provider,
                self.default_model
            );
        }

        let provider = self.get(&self.default_provider).ok_or_else(|| {
            BotchatError::Config(format!(
                "Default provider '{}' is not registered",
                self.default_provider
            ))
        })?;

        Ok(ResolvedModel {
            provider,
            model: self.default_model.clone(),
            fell_back: requested.is_some(),
        })
    }
}
