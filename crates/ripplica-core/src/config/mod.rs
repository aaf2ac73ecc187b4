//! Configuration management

use crate::error::{Result, RipplicaError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM service configuration
    #[serde(default)]
    pub llm_service: LLMServiceConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Similarity cache admission and storage
    #[serde(default)]
    pub cache: CacheConfig,

    /// Search and page fetching
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub distill: DistillConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of the LLM service for chat/completions
    pub url: String,

    /// Model name for chat completions
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Base URL for embeddings service (can be different from LLM URL)
    #[serde(default)]
    pub embedding_url: Option<String>,

    /// Model name for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensions (will be auto-detected if not specified)
    #[serde(default)]
    pub embedding_dimensions: Option<usize>,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl LLMServiceConfig {
    /// Get the embeddings URL (falls back to main URL if not specified)
    pub fn embeddings_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.url)
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("RIPPLICA_LLM_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            model: default_chat_model(),
            embedding_url: std::env::var("RIPPLICA_EMBEDDING_URL").ok(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: std::env::var("RIPPLICA_EMBEDDING_DIMS")
                .ok()
                .and_then(|s| s.parse().ok()),
            api_key: std::env::var("RIPPLICA_LLM_API_KEY").ok(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_chat_model() -> String {
    std::env::var("RIPPLICA_LLM_MODEL").unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string())
}

fn default_embedding_model() -> String {
    std::env::var("RIPPLICA_EMBEDDING_MODEL")
        .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string())
}

fn default_timeout() -> u64 {
    30
}

/// Query classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Overrides `llm_service.model` for classification
    pub model: Option<String>,
    pub timeout_secs: u64,
    /// Maximum memoized verdicts
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: None,
            timeout_secs: 10,
            cache_capacity: 1024,
            cache_ttl_secs: 3600,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 4096,
            temperature: 0.3,
        }
    }
}

/// Similarity cache configuration.
///
/// The admission weights are empirical; they are kept configurable rather
/// than hard-wired.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Combined-score threshold for a hit
    pub threshold: f32,
    /// Neighbors fetched from the store; only the nearest is evaluated
    pub top_k: usize,
    pub semantic_weight: f32,
    pub lexical_weight: f32,
    pub jaccard_weight: f32,
    pub overlap_weight: f32,
    /// SQLite file holding cache entries
    pub database: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            top_k: 1,
            semantic_weight: 0.7,
            lexical_weight: 0.3,
            jaccard_weight: 0.6,
            overlap_weight: 0.4,
            database: None,
        }
    }
}

impl CacheConfig {
    /// Resolve the database path: `RIPPLICA_DB`, then config, then the user cache dir
    pub fn database_path(&self) -> PathBuf {
        if let Ok(path) = std::env::var("RIPPLICA_DB") {
            return PathBuf::from(path);
        }
        self.database.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(crate::CACHE_DIR_NAME)
                .join("cache.sqlite")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_results: usize,
    pub max_concurrency: usize,
    /// Per-attempt page load timeout
    pub page_timeout_secs: u64,
    /// Extracted text shorter than this triggers a full-mode retry
    pub min_viable_chars: usize,
    pub light_settle_ms: u64,
    pub full_settle_ms: u64,
    pub search_endpoint: String,
    pub user_agent: String,
    /// Explicit browser binary; autodetected when unset
    pub chromium_path: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            max_concurrency: 3,
            page_timeout_secs: 15,
            min_viable_chars: 50,
            light_settle_ms: 500,
            full_settle_ms: 2000,
            search_endpoint: "https://duckduckgo.com/".to_string(),
            user_agent: format!("ripplica/{}", crate::VERSION),
            chromium_path: std::env::var("RIPPLICA_CHROMIUM_PATH")
                .ok()
                .map(PathBuf::from),
        }
    }
}

impl RetrievalConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}

/// Which re-focusing strategy the distiller leads with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistillMethod {
    #[default]
    TextRank,
    Keywords,
    Llm,
}

impl std::str::FromStr for DistillMethod {
    type Err = RipplicaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "textrank" => Ok(Self::TextRank),
            "keywords" => Ok(Self::Keywords),
            "llm" => Ok(Self::Llm),
            other => Err(RipplicaError::Config(format!(
                "unknown distill method '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillConfig {
    pub method: DistillMethod,
    pub ratio: f32,
    pub max_keyword_sentences: usize,
    pub truncate_chars: usize,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            method: DistillMethod::TextRank,
            ratio: 0.5,
            max_keyword_sentences: 10,
            truncate_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub keepalive_secs: u64,
    /// Per-session progress queue depth
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            keepalive_secs: 1,
            channel_capacity: 64,
        }
    }
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Reject values that would make the pipeline misbehave silently
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.cache.threshold) {
            return Err(RipplicaError::Config(format!(
                "cache.threshold must be within [0, 1], got {}",
                self.cache.threshold
            )));
        }
        if self.cache.top_k == 0 {
            return Err(RipplicaError::Config("cache.top_k must be >= 1".into()));
        }
        if self.retrieval.max_concurrency == 0 {
            return Err(RipplicaError::Config(
                "retrieval.max_concurrency must be >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.distill.ratio) {
            return Err(RipplicaError::Config(format!(
                "distill.ratio must be within [0, 1], got {}",
                self.distill.ratio
            )));
        }
        Ok(())
    }
}
