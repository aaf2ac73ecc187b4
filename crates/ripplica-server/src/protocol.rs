//! Request and response bodies of the HTTP API

use ripplica_core::{FailureKind, RipplicaError};
use serde::{Deserialize, Serialize};

fn default_check_threshold() -> f32 {
    0.8
}

fn default_similar_threshold() -> f32 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheCheckRequest {
    pub query: String,
    #[serde(default = "default_check_threshold")]
    pub threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheAddRequest {
    pub query: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarRequest {
    pub query: String,
    #[serde(default = "default_similar_threshold")]
    pub threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheClearResponse {
    pub message: String,
    pub removed: usize,
}

/// Body returned with every non-2xx status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub reasoning: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reasoning: reasoning.into(),
        }
    }

    pub fn kind(kind: FailureKind, reasoning: impl Into<String>) -> Self {
        Self::new(kind.label(), reasoning)
    }
}

impl From<&RipplicaError> for ErrorBody {
    fn from(err: &RipplicaError) -> Self {
        let label = match err {
            RipplicaError::InvalidInput(_) => "invalid_input",
            RipplicaError::Cancelled => "cancelled",
            other => other.failure_kind().label(),
        };
        Self::new(label, err.to_string())
    }
}
