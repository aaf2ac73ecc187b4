//! LLM trait definitions

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Decides whether a query is answerable research and whether it is time-sensitive
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, query: &str) -> Result<ClassificationVerdict>;

    fn model_name(&self) -> &str;
}

/// Synthesizes one answer from several distilled sources
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, texts: &[String], query: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Model-backed passage extraction, the last distillation tier
#[async_trait]
pub trait PassageExtractor: Send + Sync {
    async fn extract(&self, query: &str, content: &str) -> Result<String>;
}

/// Coarse intent of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryIntent {
    HowTo,
    Comparison,
    Definition,
    NewsCurrentEvents,
    Recommendation,
    StatisticsData,
    FactualQuestion,
    Other,
    InvalidQuery,
    EmptyQuery,
    UnclearResponse,
    Error,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HowTo => "HOW_TO",
            Self::Comparison => "COMPARISON",
            Self::Definition => "DEFINITION",
            Self::NewsCurrentEvents => "NEWS_CURRENT_EVENTS",
            Self::Recommendation => "RECOMMENDATION",
            Self::StatisticsData => "STATISTICS_DATA",
            Self::FactualQuestion => "FACTUAL_QUESTION",
            Self::Other => "OTHER",
            Self::InvalidQuery => "INVALID_QUERY",
            Self::EmptyQuery => "EMPTY_QUERY",
            Self::UnclearResponse => "UNCLEAR_RESPONSE",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output; produced once per query and never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationVerdict {
    pub is_valid: bool,
    pub is_time_sensitive: bool,
    pub confidence: f32,
    pub intent: QueryIntent,
    pub reasoning: String,
    #[serde(default)]
    pub inference_time_ms: u64,
}

impl ClassificationVerdict {
    /// A verdict that admits the query
    pub fn valid(is_time_sensitive: bool, intent: QueryIntent) -> Self {
        Self {
            is_valid: true,
            is_time_sensitive,
            confidence: 0.9,
            intent,
            reasoning: "Query classified as VALID".to_string(),
            inference_time_ms: 0,
        }
    }

    /// A verdict that rejects the query
    pub fn invalid(confidence: f32, intent: QueryIntent, reasoning: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            is_time_sensitive: false,
            confidence,
            intent,
            reasoning: reasoning.into(),
            inference_time_ms: 0,
        }
    }
}
