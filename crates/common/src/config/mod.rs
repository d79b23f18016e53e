//! Configuration management for Shmulik services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values
//!
//! The language-model and embedding keys additionally fall back to the
//! plain `API_KEY` variable.

use crate::errors::{AppError, Result};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Source documents
    #[serde(default)]
    pub documents: DocumentsConfig,

    /// Chunking parameters
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Vector index storage
    #[serde(default)]
    pub index: IndexConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Conversation/session configuration
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum accepted length of a chat message, in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Interval between idle-session sweeps in seconds
    #[serde(default = "default_sweep_interval")]
    pub session_sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentsConfig {
    /// PDF files or directories containing PDFs
    #[serde(default = "default_document_paths")]
    pub paths: Vec<PathBuf>,

    /// Pages with fewer alphanumeric characters than this are skipped
    #[serde(default = "default_min_page_chars")]
    pub min_page_chars: usize,

    /// Build the index at gateway start-up when none exists
    #[serde(default = "default_build_on_startup")]
    pub build_on_startup: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum overlap between adjacent chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Directory holding the persisted index
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai (any OpenAI-compatible endpoint) or hash
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_embedding_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Prefix applied to queries before embedding
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,

    /// Prefix applied to passages before embedding
    #[serde(default = "default_passage_prefix")]
    pub passage_prefix: String,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// API base URL of an OpenAI-compatible chat completions endpoint
    #[serde(default = "default_llm_base")]
    pub api_base: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name; a leading `openai/` routing prefix is stripped
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Overrides the built-in system instruction
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Similarity floor; results scoring below it are dropped
    pub min_score: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationConfig {
    /// Recent turns passed to the workflow
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Characters kept per turn when condensing history into the prompt
    #[serde(default = "default_history_turn_chars")]
    pub history_turn_chars: usize,

    /// Maximum turns retained per session
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Maximum characters retained per session
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Idle time after which a session is evicted, in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name attached to log lines
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_request_timeout() -> u64 { 120 }
fn default_max_message_chars() -> usize { 4000 }
fn default_sweep_interval() -> u64 { 60 }
fn default_document_paths() -> Vec<PathBuf> { vec![PathBuf::from("documents")] }
fn default_min_page_chars() -> usize { 20 }
fn default_build_on_startup() -> bool { true }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }
fn default_index_path() -> PathBuf { PathBuf::from("data/index") }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_base() -> String { "http://localhost:8081/v1".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_query_prefix() -> String { "query: ".to_string() }
fn default_passage_prefix() -> String { "passage: ".to_string() }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 32 }
fn default_llm_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_llm_model() -> String { "openai/gpt-4.1-mini".to_string() }
fn default_max_tokens() -> u32 { 2048 }
fn default_temperature() -> f32 { 0.7 }
fn default_llm_timeout() -> u64 { 60 }
fn default_top_k() -> usize { 4 }
fn default_history_window() -> usize { 6 }
fn default_history_turn_chars() -> usize { 500 }
fn default_max_turns() -> usize { 50 }
fn default_max_chars() -> usize { 20_000 }
fn default_idle_timeout() -> u64 { 30 * 60 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "shmulik".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_message_chars: default_max_message_chars(),
            session_sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            paths: default_document_paths(),
            min_page_chars: default_min_page_chars(),
            build_on_startup: default_build_on_startup(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: default_embedding_base(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            query_prefix: default_query_prefix(),
            passage_prefix: default_passage_prefix(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_llm_base(),
            api_key: None,
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            system_prompt: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            history_turn_chars: default_history_turn_chars(),
            max_turns: default_max_turns(),
            max_chars: default_max_chars(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl LlmConfig {
    /// Model identifier as sent on the wire
    pub fn model_id(&self) -> &str {
        self.model.strip_prefix("openai/").unwrap_or(&self.model)
    }
}

impl ConversationConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__RETRIEVAL__TOP_K=6
            .add_source(Self::environment())
            .build()?;

        Self::finish(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Self::environment())
            .build()?;

        Self::finish(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(config: Config) -> Result<Self> {
        let mut app: AppConfig = config.try_deserialize().map_err(|e: ConfigError| {
            AppError::Configuration {
                message: e.to_string(),
            }
        })?;
        app.apply_key_fallback(std::env::var("API_KEY").ok());
        app.validate()?;
        Ok(app)
    }

    fn apply_key_fallback(&mut self, api_key: Option<String>) {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        if self.llm.api_key.is_none() {
            self.llm.api_key = api_key.clone();
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = api_key;
        }
    }

    /// Reject configurations the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| -> Result<()> { Err(AppError::Configuration { message }) };

        if self.chunking.chunk_size == 0 {
            return fail("chunking.chunk_size must be positive".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return fail(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            ));
        }
        if self.embedding.dimension == 0 {
            return fail("embedding.dimension must be positive".into());
        }
        if self.embedding.batch_size == 0 {
            return fail("embedding.batch_size must be positive".into());
        }
        if self.retrieval.top_k == 0 {
            return fail("retrieval.top_k must be positive".into());
        }
        if let Some(min_score) = self.retrieval.min_score {
            if !(-1.0..=1.0).contains(&min_score) {
                return fail(format!("retrieval.min_score ({min_score}) must lie in [-1, 1]"));
            }
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return fail(format!("llm.temperature ({}) must lie in [0, 2]", self.llm.temperature));
        }
        if self.conversation.max_turns < 2 {
            return fail("conversation.max_turns must keep at least one exchange".into());
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.embedding.model, "intfloat/multilingual-e5-base");
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert!(config.retrieval.min_score.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_id_strips_routing_prefix() {
        let mut llm = LlmConfig::default();
        assert_eq!(llm.model_id(), "gpt-4.1-mini");
        llm.model = "gpt-4o".into();
        assert_eq!(llm.model_id(), "gpt-4o");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config = AppConfig::default();
        config.chunking.chunk_overlap = 1000;
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_key_fallback_only_fills_missing_keys() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("explicit".into());
        config.apply_key_fallback(Some("from-env".into()));
        assert_eq!(config.llm.api_key.as_deref(), Some("explicit"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_from_file_merges_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[retrieval]\ntop_k = 6\nmin_score = 0.2\n\n[chunking]\nchunk_size = 500\nchunk_overlap = 100"
        )
        .unwrap();

        let config = AppConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.retrieval.top_k, 6);
        assert_eq!(config.retrieval.min_score, Some(0.2));
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.server.port, 8000);
    }
}
