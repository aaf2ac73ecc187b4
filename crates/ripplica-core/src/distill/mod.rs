//! Content distiller
//!
//! Re-focuses each fetched source toward the query. Tiers, in order:
//! sentence-graph ranking (or model extraction when configured), keyword
//! scoring, then a truncated copy of the source.

mod keywords;
mod textrank;

pub use keywords::keyword_sentences;
pub use textrank::{summarize as textrank_summary, summarize_with_escalation};

use crate::config::{DistillConfig, DistillMethod};
use crate::error::StepError;
use crate::llm::PassageExtractor;
use crate::text::truncate_chars;
use futures::future::join_all;
use std::sync::Arc;

/// Sources shorter than this are skipped entirely
pub const MIN_SOURCE_CHARS: usize = 100;
/// Distilled output must be longer than this to be used
pub const MIN_FOCUSED_CHARS: usize = 50;

pub struct Distiller {
    config: DistillConfig,
    extractor: Option<Arc<dyn PassageExtractor>>,
}

impl Distiller {
    pub fn new(config: DistillConfig) -> Self {
        Self {
            config,
            extractor: None,
        }
    }

    /// Attach the model used by [`DistillMethod::Llm`]
    pub fn with_extractor(mut self, extractor: Arc<dyn PassageExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn method(&self) -> DistillMethod {
        self.config.method
    }

    /// One focused text per usable source, in source order
    pub async fn distill(&self, query: &str, texts: &[String]) -> Vec<String> {
        let usable: Vec<(usize, &String)> = texts
            .iter()
            .enumerate()
            .filter(|(i, t)| {
                let keep = t.trim().chars().count() >= MIN_SOURCE_CHARS;
                if !keep {
                    tracing::debug!("Skipping source {}: too short to distill", i + 1);
                }
                keep
            })
            .collect();

        let focused: Vec<_> = usable
            .into_iter()
            .map(|(i, content)| self.focus_or_truncate(i, query, content))
            .collect();
        join_all(focused).await
    }

    async fn focus_or_truncate(&self, index: usize, query: &str, content: &str) -> String {
        match self.focus(query, content).await {
            Ok(text) if text.trim().chars().count() > MIN_FOCUSED_CHARS => {
                tracing::debug!("Focused source {} to {} chars", index + 1, text.chars().count());
                text
            }
            Ok(_) => {
                tracing::debug!("Focused source {} too short, using truncated original", index + 1);
                self.truncated(content)
            }
            Err(e) => {
                tracing::warn!("{} for source {}, using truncated original", e, index + 1);
                self.truncated(content)
            }
        }
    }

    /// Run the configured tier chain on one source
    pub async fn focus(&self, query: &str, content: &str) -> std::result::Result<String, StepError> {
        let leading = match self.config.method {
            DistillMethod::TextRank => summarize_with_escalation(content, self.config.ratio),
            DistillMethod::Llm => self.extract_with_model(query, content).await,
            DistillMethod::Keywords => None,
        };

        leading
            .or_else(|| keyword_sentences(query, content, self.config.max_keyword_sentences))
            .ok_or_else(|| StepError::new("distill", "no passages matched the query"))
    }

    async fn extract_with_model(&self, query: &str, content: &str) -> Option<String> {
        let Some(extractor) = &self.extractor else {
            tracing::warn!("No passage extractor configured, using keyword scoring");
            return None;
        };
        match extractor.extract(query, content).await {
            Ok(passages) => Some(passages),
            Err(e) => {
                tracing::warn!("Passage extraction failed: {}, using keyword scoring", e);
                None
            }
        }
    }

    fn truncated(&self, content: &str) -> String {
        let limit = self.config.truncate_chars;
        if content.chars().count() > limit {
            format!("{}...", truncate_chars(content, limit))
        } else {
            content.to_string()
        }
    }
}
