use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackendKind {
    /// JSON file per user under `<data_dir>/index`
    Local,
    /// One Chroma collection per user
    Chroma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Gemini,
    Ollama,
}

/// Main configuration for Journal Companion
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct Config {
    /// HTTP server port
    #[validate(range(min = 1024, max = 65535))]
    pub server_port: u16,

    /// Optional bearer key required on `/api/v1` routes
    #[validate(length(min = 32))]
    pub api_key: Option<String>,

    /// Root directory for entry files and local indexes
    pub data_dir: String,

    /// Which similarity index implementation stores vectors
    pub index_backend: IndexBackendKind,

    /// Chroma base URL (chroma backend only)
    pub chroma_url: String,

    /// Key for the Gemini completion and embedding APIs
    pub google_api_key: String,

    /// Gemini API base URL
    pub completion_base_url: String,

    /// Model used for chat, extraction, summaries and analytics
    pub completion_model: String,

    #[validate(range(min = 0.0, max = 2.0))]
    pub completion_temperature: f32,

    pub embedding_provider: EmbeddingProviderKind,

    /// Embedding model name (Gemini or Ollama)
    pub embedding_model: String,

    /// Vector length produced by `embedding_model`; indexes are pinned to it
    #[validate(range(min = 1, max = 8192))]
    pub embedding_dimension: usize,

    pub ollama_host: String,
    pub ollama_port: u16,

    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,

    /// Per-call budget for each analytics annotation
    #[validate(range(min = 1, max = 600))]
    pub analytics_timeout_secs: u64,

    #[validate(range(min = 1, max = 10))]
    pub max_retries: u32,

    pub retry_base_delay_ms: u64,

    #[validate(range(min = 1, max = 64))]
    pub max_concurrent_requests: usize,

    /// Past entries pulled into a new conversation's system prompt
    #[validate(range(min = 0, max = 20))]
    pub similar_entries_k: usize,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            api_key: None,
            data_dir: default_data_dir(),
            index_backend: IndexBackendKind::Local,
            chroma_url: "http://localhost:8000".to_string(),
            google_api_key: String::new(),
            completion_base_url: "https://generativelanguage.googleapis.com".to_string(),
            completion_model: "gemini-1.5-flash".to_string(),
            completion_temperature: 0.3,
            embedding_provider: EmbeddingProviderKind::Gemini,
            embedding_model: "text-embedding-004".to_string(),
            embedding_dimension: 768,
            ollama_host: "http://localhost".to_string(),
            ollama_port: 11434,
            request_timeout_secs: 60,
            analytics_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
            max_concurrent_requests: 4,
            similar_entries_k: 3,
            log_level: "info".to_string(),
        }
    }
}

fn default_data_dir() -> String {
    dirs::home_dir()
        .map(|home| home.join(".journal-companion").join("data"))
        .unwrap_or_else(|| PathBuf::from("data"))
        .to_string_lossy()
        .into_owned()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        let settings = config::Config::builder()
            // Core defaults
            .set_default("server_port", defaults.server_port)?
            .set_default("data_dir", defaults.data_dir)?
            .set_default("index_backend", "local")?
            .set_default("chroma_url", defaults.chroma_url)?
            // The conventional Gemini variable, below file and JOURNAL__ overrides
            .set_default(
                "google_api_key",
                std::env::var("GOOGLE_API_KEY").unwrap_or(defaults.google_api_key),
            )?
            .set_default("completion_base_url", defaults.completion_base_url)?
            .set_default("completion_model", defaults.completion_model)?
            .set_default("completion_temperature", defaults.completion_temperature as f64)?
            .set_default("embedding_provider", "gemini")?
            .set_default("embedding_model", defaults.embedding_model)?
            .set_default("embedding_dimension", defaults.embedding_dimension as u64)?
            .set_default("ollama_host", defaults.ollama_host)?
            .set_default("ollama_port", defaults.ollama_port)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?
            .set_default("analytics_timeout_secs", defaults.analytics_timeout_secs)?
            .set_default("max_retries", defaults.max_retries)?
            .set_default("retry_base_delay_ms", defaults.retry_base_delay_ms)?
            .set_default("max_concurrent_requests", defaults.max_concurrent_requests as u64)?
            .set_default("similar_entries_k", defaults.similar_entries_k as u64)?
            .set_default("log_level", defaults.log_level)?
            // Load from ~/.journal-companion/config.toml (if present)
            .add_source(
                config::File::with_name(&format!(
                    "{}/.journal-companion/config",
                    home.display()
                ))
                .required(false),
            )
            // Environment overrides: JOURNAL__SERVER_PORT, JOURNAL__API_KEY, etc.
            .add_source(config::Environment::with_prefix("JOURNAL").separator("__"))
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn entries_dir(&self) -> PathBuf {
        self.data_path().join("journal_entries")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_path().join("index")
    }

    /// Whether `token` matches the configured key. Always true when no key
    /// is configured.
    pub fn is_valid_api_key(&self, token: &str) -> bool {
        match &self.api_key {
            Some(expected) => expected == token,
            None => true,
        }
    }
}
