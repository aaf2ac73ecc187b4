//! Ripplica Core Library
//!
//! Answers natural-language research queries from the web, with a semantic
//! cache in front of retrieval.
//!
//! # Features
//! - Query classification (research vs. command, time-sensitive vs. timeless)
//! - Similarity cache admitting hits on blended semantic and lexical scores
//! - DuckDuckGo search and bounded concurrent page fetching via headless Chromium
//! - Readable-text extraction and query-focused distillation (TextRank, keywords, LLM)
//! - LLM summarization over OpenAI-compatible endpoints
//! - Per-session progress events for streaming observers

pub mod cache;
pub mod config;
pub mod distill;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod retrieval;
pub mod runtime;
pub mod text;

pub use cache::{
    CacheEntry, InMemoryVectorStore, SimilarityCache, SqliteVectorStore, VectorStore,
};
pub use config::{Config, DistillMethod, LLMServiceConfig};
pub use distill::Distiller;
pub use error::{Error, Failure, FailureKind, Result, RipplicaError, StepError};
pub use llm::{
    ClassificationVerdict, Classifier, Embedder, HttpClassifier, HttpEmbedder, HttpSummarizer,
    LLMClient, MetricsSnapshot, PassageExtractor, QueryIntent, Summarizer, VLLMClient,
};
pub use pipeline::{Collaborators, Pipeline, PipelineOptions, QueryOutcome};
pub use progress::{ProgressEmitter, ProgressEvent, ProgressHub, ProgressSubscription, Step};
pub use retrieval::{
    FetchMode, PageFetcher, Retrieval, RetrievalResult, Retriever, SearchProvider,
};
pub use runtime::Runtime;

/// Crate version, used in the default user agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default cache directory name
pub const CACHE_DIR_NAME: &str = "ripplica";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "ripplica";
