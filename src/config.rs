//! Configuration management for Botchat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{BotchatError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Main configuration structure for Botchat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider configuration (OpenAI, Together)
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Turn handling behavior
    #[serde(default)]
    pub chat: ChatConfig,
    /// Retrieval service settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Document chunking settings
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Session persistence settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Turn API server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Provider configuration
///
/// Selects the fallback provider/model and holds per-vendor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider used when a model identifier cannot be resolved
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used when a model identifier cannot be resolved
    #[serde(default = "default_model")]
    pub default_model: String,

    /// OpenAI configuration
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Together configuration
    #[serde(default)]
    pub together: TogetherConfig,

    /// Additional catalog entries beyond the built-in model list
    #[serde(default)]
    pub extra_models: Vec<crate::providers::ModelOption>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            openai: OpenAiConfig::default(),
            together: TogetherConfig::default(),
            extra_models: Vec::new(),
        }
    }
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key; falls back to `OPENAI_API_KEY` and then the OS keyring
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// API base URL (useful for tests and compatible gateways)
    #[serde(default = "default_openai_base")]
    pub api_base: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in a completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_provider_timeout() -> u64 {
    60
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_openai_base(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_provider_timeout(),
        }
    }
}

/// Together provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TogetherConfig {
    /// API key; falls back to `TOGETHER_API_KEY` and then the OS keyring
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_together_base")]
    pub api_base: String,

    /// Model used when a Together request names none
    #[serde(default = "default_together_model")]
    pub default_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in a completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
}

fn default_together_base() -> String {
    "https://api.together.xyz/v1".to_string()
}

fn default_together_model() -> String {
    "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo".to_string()
}

impl Default for TogetherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_together_base(),
            default_model: default_together_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_provider_timeout(),
        }
    }
}

/// Turn handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Longest accepted user message in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Stream replies by default
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Message count at which a title is generated
    #[serde(default = "default_title_min_messages")]
    pub title_min_messages: usize,

    /// How many leading messages feed the title prompt
    #[serde(default = "default_title_context_messages")]
    pub title_context_messages: usize,

    /// History length above which older turns are summarized
    #[serde(default = "default_verbatim_history_limit")]
    pub verbatim_history_limit: usize,

    /// Recent messages kept verbatim when summarizing
    #[serde(default = "default_summary_keep_recent")]
    pub summary_keep_recent: usize,

    /// Upper bound on a single streamed reply in seconds
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_seconds: u64,
}

fn default_max_message_length() -> usize {
    4000
}

fn default_true() -> bool {
    true
}

fn default_title_min_messages() -> usize {
    3
}

fn default_title_context_messages() -> usize {
    3
}

fn default_verbatim_history_limit() -> usize {
    crate::memory::DEFAULT_VERBATIM_HISTORY_LIMIT
}

fn default_summary_keep_recent() -> usize {
    crate::memory::DEFAULT_SUMMARY_KEEP_RECENT
}

fn default_stream_timeout() -> u64 {
    120
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            stream: true,
            title_min_messages: default_title_min_messages(),
            title_context_messages: default_title_context_messages(),
            verbatim_history_limit: default_verbatim_history_limit(),
            summary_keep_recent: default_summary_keep_recent(),
            stream_timeout_seconds: default_stream_timeout(),
        }
    }
}

/// Retrieval service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Augment prompts with retrieved context
    #[serde(default)]
    pub enabled: bool,

    /// Index host, e.g. `https://my-index-abc123.svc.pinecone.io`
    #[serde(default)]
    pub host: Option<String>,

    /// API key; falls back to `PINECONE_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Namespace records are written to and searched in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Number of hits folded into a prompt
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Request timeout in seconds
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_seconds: u64,

    /// Delete a session's indexed chunks when the session is deleted
    #[serde(default = "default_true")]
    pub purge_on_session_delete: bool,
}

fn default_namespace() -> String {
    "__default__".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_retrieval_timeout() -> u64 {
    15
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: None,
            api_key: None,
            namespace: default_namespace(),
            top_k: default_top_k(),
            timeout_seconds: default_retrieval_timeout(),
            purge_on_session_delete: true,
        }
    }
}

/// Chunking configuration for uploaded documents
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between adjacent chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    crate::chunker::DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    crate::chunker::DEFAULT_CHUNK_OVERLAP
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

/// Session storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sled,
    Sqlite,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = BotchatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sled" => Ok(Self::Sled),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(BotchatError::Config(format!(
                "Invalid storage backend: {}. Must be one of: sled, sqlite, memory",
                other
            ))),
        }
    }
}

/// Session storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend kind
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory (or SQLite file) for persisted data; platform data dir when unset
    #[serde(default)]
    pub path: Option<String>,
}

/// Turn API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Provider ids the registry knows how to construct
pub const KNOWN_PROVIDERS: [&str; 2] = ["openai", "together"];

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BotchatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| BotchatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        // Provider overrides
        if let Ok(provider) = std::env::var("BOTCHAT_PROVIDER") {
            self.provider.default_provider = provider;
        }
        if let Ok(model) = std::env::var("BOTCHAT_MODEL") {
            self.provider.default_model = model;
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if self.provider.openai.api_key.is_none() && !key.is_empty() {
                self.provider.openai.api_key = Some(key);
            }
        }
        if let Ok(base) = std::env::var("OPENAI_API_BASE") {
            self.provider.openai.api_base = base;
        }

        if let Ok(key) = std::env::var("TOGETHER_API_KEY") {
            if self.provider.together.api_key.is_none() && !key.is_empty() {
                self.provider.together.api_key = Some(key);
            }
        }
        if let Ok(base) = std::env::var("TOGETHER_API_BASE") {
            self.provider.together.api_base = base;
        }
        if let Ok(model) = std::env::var("TOGETHER_MODEL") {
            self.provider.together.default_model = model;
        }

        // Retrieval overrides
        if let Ok(key) = std::env::var("PINECONE_API_KEY") {
            if self.retrieval.api_key.is_none() && !key.is_empty() {
                self.retrieval.api_key = Some(key);
            }
        }
        if let Ok(host) = std::env::var("PINECONE_HOST") {
            self.retrieval.host = Some(host);
        }
        if let Ok(namespace) = std::env::var("PINECONE_NAMESPACE") {
            self.retrieval.namespace = namespace;
        }
        if let Ok(enabled) = std::env::var("BOTCHAT_RAG_ENABLED") {
            match enabled.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.retrieval.enabled = true,
                "0" | "false" | "no" | "off" => self.retrieval.enabled = false,
                other => tracing::warn!("Ignoring invalid BOTCHAT_RAG_ENABLED value: {}", other),
            }
        }
        if let Ok(top_k) = std::env::var("BOTCHAT_TOP_K") {
            if let Ok(value) = top_k.parse::<usize>() {
                self.retrieval.top_k = value;
            } else {
                tracing::warn!("Ignoring invalid BOTCHAT_TOP_K value: {}", top_k);
            }
        }

        // Storage overrides
        if let Ok(backend) = std::env::var("BOTCHAT_STORAGE_BACKEND") {
            match backend.parse::<StorageBackend>() {
                Ok(value) => self.storage.backend = value,
                Err(e) => tracing::warn!("Ignoring BOTCHAT_STORAGE_BACKEND: {}", e),
            }
        }
        if let Ok(path) = std::env::var("BOTCHAT_STORAGE_PATH") {
            self.storage.path = Some(path);
        }

        if let Ok(bind) = std::env::var("BOTCHAT_SERVER_BIND") {
            self.server.bind = bind;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(path) = &cli.storage_path {
            self.storage.path = Some(path.clone());
        }
        if cli.ephemeral {
            self.storage.backend = StorageBackend::Memory;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if !KNOWN_PROVIDERS.contains(&self.provider.default_provider.as_str()) {
            return Err(BotchatError::Config(format!(
                "Invalid provider: {}. Must be one of: {}",
                self.provider.default_provider,
                KNOWN_PROVIDERS.join(", ")
            ))
            .into());
        }

        if self.provider.default_model.trim().is_empty() {
            return Err(
                BotchatError::Config("provider.default_model cannot be empty".to_string()).into(),
            );
        }

        for (name, temperature, max_tokens, base) in [
            (
                "openai",
                self.provider.openai.temperature,
                self.provider.openai.max_tokens,
                &self.provider.openai.api_base,
            ),
            (
                "together",
                self.provider.together.temperature,
                self.provider.together.max_tokens,
                &self.provider.together.api_base,
            ),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(BotchatError::Config(format!(
                    "provider.{}.temperature must be between 0.0 and 2.0",
                    name
                ))
                .into());
            }
            if max_tokens == 0 {
                return Err(BotchatError::Config(format!(
                    "provider.{}.max_tokens must be greater than 0",
                    name
                ))
                .into());
            }
            url::Url::parse(base).map_err(|e| {
                BotchatError::Config(format!("provider.{}.api_base is invalid: {}", name, e))
            })?;
        }

        if self.chat.max_message_length == 0 {
            return Err(BotchatError::Config(
                "chat.max_message_length must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chunking.chunk_size == 0 {
            return Err(BotchatError::Config(
                "chunking.chunk_size must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(BotchatError::Config(
                "chunking.overlap must be smaller than chunking.chunk_size".to_string(),
            )
            .into());
        }

        if self.retrieval.top_k == 0 || self.retrieval.top_k > 100 {
            return Err(BotchatError::Config(
                "retrieval.top_k must be between 1 and 100".to_string(),
            )
            .into());
        }

        if self.retrieval.enabled {
            match &self.retrieval.host {
                None => {
                    return Err(BotchatError::Config(
                        "retrieval.host is required when retrieval is enabled".to_string(),
                    )
                    .into())
                }
                Some(host) => {
                    url::Url::parse(host).map_err(|e| {
                        BotchatError::Config(format!("retrieval.host is invalid: {}", e))
                    })?;
                }
            }
        }

        self.server.bind.parse::<SocketAddr>().map_err(|e| {
            BotchatError::Config(format!(
                "server.bind '{}' is not a socket address: {}",
                self.server.bind, e
            ))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use serial_test::serial;

    fn cli_with(storage_path: Option<&str>, ephemeral: bool) -> Cli {
        Cli {
            config: None,
            verbose: false,
            json_logs: false,
            storage_path: storage_path.map(str::to_string),
            ephemeral,
            command: Commands::Serve { bind: None },
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.provider.default_provider, "openai");
        assert_eq!(config.provider.default_model, "gpt-4o-mini");
        assert_eq!(config.chat.max_message_length, 4000);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
provider:
  default_provider: together
  default_model: meta-llama/Llama-3.3-70B-Instruct-Turbo
retrieval:
  enabled: true
  host: https://index.example.io
storage:
  backend: sqlite
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provider.default_provider, "together");
        assert_eq!(config.provider.openai.max_tokens, 1000);
        assert!(config.retrieval.enabled);
        assert_eq!(config.retrieval.namespace, "__default__");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = Config::default();
        config.provider.default_provider = "anthropic".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid provider"));
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_chunk() {
        let mut config = Config::default();
        config.chunking.overlap = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_host_when_retrieval_enabled() {
        let mut config = Config::default();
        config.retrieval.enabled = true;
        assert!(config.validate().is_err());
        config.retrieval.host = Some("https://idx.example.io".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_bind_and_temperature() {
        let mut config = Config::default();
        config.server.bind = "not-an-address".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.provider.openai.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_keys_are_not_serialized() {
        let mut config = Config::default();
        config.provider.openai.api_key = Some("sk-secret".to_string());
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("sk-secret"));
    }

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("SQLite".parse::<StorageBackend>().unwrap(), StorageBackend::Sqlite);
        assert!("postgres".parse::<StorageBackend>().is_err());
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults_and_cli_overrides() {
        let config = Config::load("does-not-exist.yaml", &cli_with(Some("/tmp/bc"), true)).unwrap();
        assert_eq!(config.storage.path.as_deref(), Some("/tmp/bc"));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_overrides_fields() {
        std::env::set_var("BOTCHAT_MODEL", "gpt-3.5-turbo");
        std::env::set_var("BOTCHAT_RAG_ENABLED", "true");
        std::env::set_var("PINECONE_HOST", "https://env-index.example.io");
        std::env::set_var("BOTCHAT_TOP_K", "7");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("BOTCHAT_MODEL");
        std::env::remove_var("BOTCHAT_RAG_ENABLED");
        std::env::remove_var("PINECONE_HOST");
        std::env::remove_var("BOTCHAT_TOP_K");

        assert_eq!(config.provider.default_model, "gpt-3.5-turbo");
        assert!(config.retrieval.enabled);
        assert_eq!(
            config.retrieval.host.as_deref(),
            Some("https://env-index.example.io")
        );
        assert_eq!(config.retrieval.top_k, 7);
    }

    #[test]
    #[serial]
    fn test_config_file_api_key_wins_over_env() {
        std::env::set_var("OPENAI_API_KEY", "from-env");
        let mut config = Config::default();
        config.provider.openai.api_key = Some("from-file".to_string());
        config.apply_env_vars();
        std::env::remove_var("OPENAI_API_KEY");
        assert_eq!(config.provider.openai.api_key.as_deref(), Some("from-file"));
    }
}
