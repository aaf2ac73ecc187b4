//! Error types for ripplica

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using RipplicaError
pub type Result<T> = std::result::Result<T, RipplicaError>;

/// Error type alias for convenience
pub type Error = RipplicaError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const UNAVAILABLE: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Main error type for ripplica
#[derive(Debug, Error)]
pub enum RipplicaError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalError(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RipplicaError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_) | Self::Config(_) => exit_codes::INVALID_INPUT,
            Self::Embedding(_) | Self::Classification(_) | Self::Http(_) => {
                exit_codes::UNAVAILABLE
            }
            _ => exit_codes::GENERAL_ERROR,
        }
    }

    /// Map an error onto the user-facing failure taxonomy
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Embedding(_) | Self::Classification(_) | Self::Http(_) | Self::Timeout(_) => {
                FailureKind::CollaboratorUnavailable
            }
            _ => FailureKind::DegradedStep,
        }
    }

    /// Convert into the structured failure carried by responses
    pub fn to_failure(&self) -> Failure {
        Failure::new(self.failure_kind(), self.to_string())
    }
}

/// User-visible failure categories.
///
/// Only `Rejection` and `CollaboratorUnavailable` ever end a run; the other
/// two are absorbed below the controller and only show up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Classifier judged the query not to be answerable research
    Rejection,
    /// Search, fetch, distill or summarize produced partial or no output
    DegradedStep,
    /// Classifier or embedding service could not be reached
    CollaboratorUnavailable,
    /// A progress event could not be delivered to its observer
    ChannelDelivery,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rejection => "query_invalid",
            Self::DegradedStep => "degraded_step",
            Self::CollaboratorUnavailable => "collaborator_unavailable",
            Self::ChannelDelivery => "channel_delivery",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Structured failure: a short label plus reasoning text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub reasoning: String,
}

impl Failure {
    pub fn new(kind: FailureKind, reasoning: impl Into<String>) -> Self {
        Self {
            kind,
            reasoning: reasoning.into(),
        }
    }
}

/// Error produced by a single degradable pipeline step
#[derive(Debug, Clone, Error)]
#[error("{step} failed: {message}")]
pub struct StepError {
    pub step: &'static str,
    pub message: String,
}

impl StepError {
    pub fn new(step: &'static str, err: impl std::fmt::Display) -> Self {
        Self {
            step,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            RipplicaError::InvalidInput("x".into()).exit_code(),
            exit_codes::INVALID_INPUT
        );
        assert_eq!(
            RipplicaError::Embedding("down".into()).exit_code(),
            exit_codes::UNAVAILABLE
        );
        assert_eq!(RipplicaError::Cancelled.exit_code(), exit_codes::GENERAL_ERROR);
    }

    #[test]
    fn test_failure_labels() {
        let failure = RipplicaError::Classification("timeout".into()).to_failure();
        assert_eq!(failure.kind, FailureKind::CollaboratorUnavailable);
        assert_eq!(failure.kind.label(), "collaborator_unavailable");
        assert!(failure.reasoning.contains("timeout"));

        let json = serde_json::to_string(&FailureKind::Rejection).unwrap();
        assert_eq!(json, "\"rejection\"");
    }

    #[test]
    fn test_step_error_display() {
        let err = StepError::new("search", "connection reset");
        assert_eq!(err.to_string(), "search failed: connection reset");
    }
}
