//! Built-in model catalog
//!
//! Maps user-facing model identifiers to the provider that serves them.

use serde::{Deserialize, Serialize};

/// A selectable provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderOption {
    pub id: &'static str,
    pub name: &'static str,
}

/// Providers shipped with Botchat
pub const PROVIDERS: [ProviderOption; 2] = [
    ProviderOption {
        id: "openai",
        name: "OpenAI",
    },
    ProviderOption {
        id: "together",
        name: "Together.ai",
    },
];

/// A selectable model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOption {
    /// Display name
    pub name: String,
    /// Identifier sent to the vendor
    pub value: String,
    /// Provider id that serves this model
    pub provider: String,
}

impl ModelOption {
    pub fn new(name: &str, value: &str, provider: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            provider: provider.to_string(),
        }
    }
}

const BUILTIN: &[(&str, &str, &str)] = &[
    ("GPT-4o Mini", "gpt-4o-mini", "openai"),
    ("GPT-3.5 Turbo", "gpt-3.5-turbo", "openai"),
    ("Llama 3.3 70B Turbo", "meta-llama/Llama-3.3-70B-Instruct-Turbo", "together"),
    ("Llama 3.1 8B Instruct Turbo", "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo", "together"),
    ("Llama 3.1 405B Instruct Turbo", "meta-llama/Meta-Llama-3.1-405B-Instruct-Turbo", "together"),
    ("Llama 3.2 3B Instruct Turbo", "meta-llama/Llama-3.2-3B-Instruct-Turbo", "together"),
    ("Llama 3 8B Instruct Lite", "meta-llama/Meta-Llama-3-8B-Instruct-Lite", "together"),
    ("Llama 3 70B Instruct Reference", "meta-llama/Llama-3-70b-chat-hf", "together"),
    ("Qwen3 235B A22B FP8 Throughput", "Qwen/Qwen3-235B-A22B-fp8-tput", "together"),
    ("Qwen 2.5 72B Instruct Turbo", "Qwen/Qwen2.5-72B-Instruct-Turbo", "together"),
    ("DeepSeek R1", "deepseek-ai/DeepSeek-R1", "together"),
    ("DeepSeek V3", "deepseek-ai/DeepSeek-V3", "together"),
    ("Mistral Small 3 Instruct (24B)", "mistralai/Mistral-Small-24B-Instruct-2501", "together"),
    ("Mistral 7B Instruct v0.3", "mistralai/Mistral-7B-Instruct-v0.3", "together"),
    ("Gemma 2 27B", "google/gemma-2-27b-it", "together"),
    ("Nous Hermes 2 - Mixtral 8x7B-DPO", "NousResearch/Nous-Hermes-2-Mixtral-8x7B-DPO", "together"),
];

/// Built-in model list
pub fn builtin_models() -> Vec<ModelOption> {
    BUILTIN
        .iter()
        .map(|(name, value, provider)| ModelOption::new(name, value, provider))
        .collect()
}

/// Display name of a provider id, falling back to the id itself
pub fn provider_name(id: &str) -> &str {
    PROVIDERS
        .iter()
        .find(|p| p.id == id)
        .map(|p| p.name)
        .unwrap_or(id)
}
