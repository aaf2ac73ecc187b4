//! LLM integration
//!
//! Provides traits and HTTP implementations for:
//! - Embedding generation via external services (vLLM, OpenAI, etc.)
//! - Query classification
//! - Passage extraction
//! - Answer summarization

mod cache;
mod classifier;
mod client;
mod extractor;
mod http_embedder;
mod summarizer;
mod traits;

pub use cache::{TtlCache, TtlCacheStats};
pub use classifier::{determine_intent, looks_time_sensitive, parse_verdict, HttpClassifier};
pub use client::{ChatMessage, ChatOptions, LLMClient, MetricsSnapshot, VLLMClient};
pub use extractor::HttpPassageExtractor;
pub use http_embedder::HttpEmbedder;
pub use summarizer::HttpSummarizer;
pub use traits::*;
