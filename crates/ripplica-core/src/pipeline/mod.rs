//! Pipeline controller
//!
//! Sequences classification, cache admission, retrieval, distillation,
//! summarization and the cache write for one query, reporting each step
//! through a [`ProgressEmitter`].

mod outcome;

pub use outcome::{
    CacheAddOutcome, CacheCheckOutcome, CacheSimilarOutcome, CacheStatsOutcome, QueryOutcome,
    ScrapeOnlyOutcome, SearchOnlyOutcome, SimilarQuery, INVALID_SUMMARY, NO_CONTENT_SUMMARY,
};

use crate::cache::{admits, ScoredEntry, SimilarityCache};
use crate::config::Config;
use crate::distill::Distiller;
use crate::error::{Failure, FailureKind, Result, RipplicaError};
use crate::llm::{ClassificationVerdict, Classifier, Embedder, Summarizer};
use crate::progress::{ProgressEmitter, Step};
use crate::retrieval::Retriever;
use crate::text::truncate_chars;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const PREVIEW_CHARS: usize = 100;

/// Tunables for a pipeline instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    pub threshold: f32,
    pub top_k: usize,
    pub max_results: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            top_k: 1,
            max_results: 5,
        }
    }
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            threshold: config.cache.threshold,
            top_k: config.cache.top_k,
            max_results: config.retrieval.max_results,
        }
    }
}

/// Everything the controller calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub embedder: Arc<dyn Embedder>,
    pub summarizer: Arc<dyn Summarizer>,
    pub cache: Arc<SimilarityCache>,
    pub retriever: Arc<Retriever>,
    pub distiller: Arc<Distiller>,
}

pub struct Pipeline {
    classifier: Arc<dyn Classifier>,
    embedder: Arc<dyn Embedder>,
    summarizer: Arc<dyn Summarizer>,
    cache: Arc<SimilarityCache>,
    retriever: Arc<Retriever>,
    distiller: Arc<Distiller>,
    options: PipelineOptions,
}

/// Run `fut` unless `cancel` fires first
async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RipplicaError::Cancelled),
        value = fut => Ok(value),
    }
}

fn seconds_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

fn classification_reasoning(err: &RipplicaError) -> String {
    match err {
        RipplicaError::Classification(msg) => format!("Classification error: {}", msg),
        other => format!("Classification error: {}", other),
    }
}

/// Answer used when the summarizer is unavailable; never cached
fn fallback_summary(focused: &[String], urls: &[String]) -> String {
    let mut summary = String::from(
        "A synthesized answer could not be generated. Relevant excerpts from the retrieved sources follow.\n",
    );
    for (i, text) in focused.iter().enumerate() {
        summary.push('\n');
        if let Some(url) = urls.get(i) {
            summary.push_str(&format!("## {}\n\n", url));
        }
        summary.push_str(truncate_chars(text, 500));
        summary.push('\n');
    }
    summary
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, options: PipelineOptions) -> Self {
        Self {
            classifier: collaborators.classifier,
            embedder: collaborators.embedder,
            summarizer: collaborators.summarizer,
            cache: collaborators.cache,
            retriever: collaborators.retriever,
            distiller: collaborators.distiller,
            options,
        }
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    pub fn cache(&self) -> &SimilarityCache {
        &self.cache
    }

    /// Process one query end to end.
    ///
    /// Rejected queries and classifier failures come back as an invalid
    /// outcome. `Err` is reserved for an unreachable embedding service and
    /// for cancellation.
    pub async fn run(
        &self,
        query: &str,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome> {
        let started = Instant::now();
        tracing::info!("Processing query '{}'", query);

        emitter.emit(Step::Validating, json!({ "query": query }));
        emitter.emit(Step::Classifying, Value::Null);

        let verdict = match cancellable(cancel, self.classifier.classify(query)).await? {
            Ok(verdict) => verdict,
            Err(e) => {
                let reasoning = classification_reasoning(&e);
                tracing::error!("{}", reasoning);
                emitter.emit(Step::Invalid, json!({ "reasoning": reasoning }));
                return Ok(QueryOutcome::rejected(
                    None,
                    Failure::new(FailureKind::CollaboratorUnavailable, reasoning),
                    seconds_since(started),
                ));
            }
        };

        if !verdict.is_valid {
            tracing::info!("Query rejected: {}", verdict.reasoning);
            emitter.emit(
                Step::Invalid,
                json!({
                    "reasoning": verdict.reasoning,
                    "intent": verdict.intent,
                    "confidence": verdict.confidence,
                }),
            );
            let failure = Failure::new(FailureKind::Rejection, verdict.reasoning.clone());
            return Ok(QueryOutcome::rejected(Some(verdict), failure, seconds_since(started)));
        }

        let mut outcome = QueryOutcome {
            valid: true,
            is_valid: true,
            is_time_sensitive: verdict.is_time_sensitive,
            classification: Some(verdict.clone()),
            ..Default::default()
        };

        let embedding = if verdict.is_time_sensitive {
            tracing::info!("Time-sensitive query, bypassing cache");
            None
        } else {
            let embedding = cancellable(cancel, self.embedder.embed(query))
                .await?
                .map_err(|e| {
                    tracing::error!("Embedding service unavailable: {}", e);
                    e
                })?;

            if let Some(hit) = self.check_cache(query, &embedding, emitter).await {
                outcome.from_cache = true;
                outcome.summary = hit.entry.answer_text;
                outcome.cached_query = Some(hit.entry.query_text);
                outcome.cache_similarity = hit.combined;
                outcome.processing_time = seconds_since(started);
                emitter.emit(
                    Step::Done,
                    json!({ "from_cache": true, "processing_time": outcome.processing_time }),
                );
                return Ok(outcome);
            }
            Some(embedding)
        };

        // Search, then scrape
        emitter.emit(Step::Searching, json!({ "max_results": self.options.max_results }));
        let retrieval = self
            .retriever
            .retrieve(query, self.options.max_results, cancel, |urls| {
                emitter.emit(Step::Scraping, json!({ "urls_found": urls.len(), "urls": urls }));
            })
            .await;
        outcome.search_time = retrieval.timings.search_time;
        outcome.scrape_time = retrieval.timings.scrape_time;
        outcome.urls_found = retrieval.urls.len();
        if cancel.is_cancelled() {
            return Err(RipplicaError::Cancelled);
        }

        let results = retrieval.results;
        let (scraped_urls, texts): (Vec<String>, Vec<String>) = results
            .into_iter()
            .filter(|r| r.success)
            .map(|r| (r.url, r.content))
            .unzip();
        outcome.content_scraped = texts.len();
        outcome.scraped_urls = scraped_urls;
        tracing::info!("Scraped {}/{} URLs", outcome.content_scraped, outcome.urls_found);

        // Distill
        emitter.emit(Step::Extracting, json!({ "sources": texts.len() }));
        let phase = Instant::now();
        let focused = cancellable(cancel, self.distiller.distill(query, &texts)).await?;
        outcome.extraction_time = seconds_since(phase);

        // Summarize
        emitter.emit(Step::Summarizing, json!({ "sources": focused.len() }));
        let phase = Instant::now();
        let (summary, summarized) = if focused.is_empty() {
            tracing::warn!(kind = %FailureKind::DegradedStep, "No content to summarize");
            (NO_CONTENT_SUMMARY.to_string(), false)
        } else {
            match cancellable(cancel, self.summarizer.summarize(&focused, query)).await? {
                Ok(summary) => (summary, true),
                Err(e) => {
                    tracing::warn!(kind = %FailureKind::DegradedStep, "Summarization failed: {}", e);
                    (fallback_summary(&focused, &outcome.scraped_urls), false)
                }
            }
        };
        outcome.summarization_time = seconds_since(phase);
        outcome.summary = summary;

        // Cache write
        if let (Some(embedding), true) = (embedding, summarized) {
            emitter.emit(Step::Caching, Value::Null);
            if let Err(e) = self.cache.insert(query, embedding, &outcome.summary).await {
                tracing::warn!(kind = %FailureKind::DegradedStep, "Cache write failed: {}", e);
            }
        }

        outcome.processing_time = seconds_since(started);
        emitter.emit(
            Step::Done,
            json!({
                "from_cache": false,
                "urls_found": outcome.urls_found,
                "content_scraped": outcome.content_scraped,
                "processing_time": outcome.processing_time,
            }),
        );
        tracing::info!(
            "Query '{}' completed in {:.2}s",
            query,
            outcome.processing_time
        );
        Ok(outcome)
    }

    /// Nearest-neighbor admission. Store failures degrade to a miss.
    async fn check_cache(
        &self,
        query: &str,
        embedding: &[f32],
        emitter: &ProgressEmitter,
    ) -> Option<ScoredEntry> {
        let nearest = match self.cache.nearest(query, embedding, self.options.top_k).await {
            Ok(nearest) => nearest,
            Err(e) => {
                tracing::warn!(kind = %FailureKind::DegradedStep, "Cache lookup failed: {}", e);
                None
            }
        };

        let similarity = nearest.as_ref().map(|s| s.combined).unwrap_or(0.0);
        let hit = nearest
            .as_ref()
            .is_some_and(|s| admits(s.combined, self.options.threshold));
        emitter.emit(
            Step::Similarity,
            json!({
                "similarity": similarity,
                "threshold": self.options.threshold,
                "hit": hit,
                "cached_query": nearest.as_ref().map(|s| s.entry.query_text.clone()),
            }),
        );

        if !hit {
            tracing::info!("Cache miss (similarity {:.3})", similarity);
            return None;
        }
        let scored = nearest?;
        tracing::info!(
            "Cache hit: '{}' (similarity {:.3})",
            scored.entry.query_text,
            scored.combined
        );
        emitter.emit(
            Step::CacheHit,
            json!({ "similarity": scored.combined, "cached_query": scored.entry.query_text }),
        );
        Some(scored)
    }

    pub async fn classify(&self, query: &str) -> Result<ClassificationVerdict> {
        self.classifier.classify(query).await
    }

    pub async fn search_only(&self, query: &str, max_results: Option<usize>) -> SearchOnlyOutcome {
        let max = max_results.unwrap_or(self.options.max_results);
        let (urls, error) = match self
            .retriever
            .search(query, max, &CancellationToken::new())
            .await
        {
            Ok(urls) => (urls, None),
            Err(e) => {
                tracing::warn!("{}", e);
                (Vec::new(), Some(e.to_string()))
            }
        };
        SearchOnlyOutcome {
            query: query.to_string(),
            urls_found: urls.len(),
            urls,
            error,
        }
    }

    pub async fn scrape_only(&self, urls: &[String], cancel: &CancellationToken) -> ScrapeOnlyOutcome {
        let results = self.retriever.fetch_all(urls, cancel).await;
        ScrapeOnlyOutcome {
            urls_processed: urls.len(),
            successful_scrapes: results.iter().filter(|r| r.success).count(),
            results,
        }
    }

    pub async fn cache_stats(&self) -> Result<CacheStatsOutcome> {
        let stats = self.cache.stats().await?;
        Ok(CacheStatsOutcome {
            cache_count: stats.count,
            cached_queries: stats.entries,
        })
    }

    pub async fn cache_clear(&self) -> Result<usize> {
        self.cache.clear().await
    }

    /// Whether `query` would hit the cache at `threshold`
    pub async fn cache_check(&self, query: &str, threshold: Option<f32>) -> Result<CacheCheckOutcome> {
        let threshold = threshold.unwrap_or(self.options.threshold);
        let embedding = self.embedder.embed(query).await?;
        let check = self.cache.check(query, &embedding, threshold).await?;
        Ok(CacheCheckOutcome {
            query: query.to_string(),
            threshold,
            hit: check.hit,
            similarity: check.similarity,
            cached_query: check.cached_query,
        })
    }

    /// Store an answer for `query` directly
    pub async fn cache_add(&self, query: &str, answer: &str) -> Result<CacheAddOutcome> {
        if query.trim().is_empty() || answer.trim().is_empty() {
            return Err(RipplicaError::InvalidInput(
                "query and answer must both be non-empty".to_string(),
            ));
        }
        let embedding = self.embedder.embed(query).await?;
        let entry = self.cache.insert(query, embedding, answer).await?;
        Ok(CacheAddOutcome {
            success: true,
            doc_id: entry.id.to_string(),
            query: entry.query_text,
            summary_length: entry.answer_text.chars().count(),
        })
    }

    /// Cached queries whose embedding similarity reaches `threshold`
    pub async fn cache_similar(&self, query: &str, threshold: f32) -> Result<CacheSimilarOutcome> {
        let embedding = self.embedder.embed(query).await?;
        let total = self.cache.count().await?;
        let similar: Vec<SimilarQuery> = self
            .cache
            .similar(&embedding, threshold)
            .await?
            .into_iter()
            .map(|s| {
                let summary_preview = if s.answer.chars().count() > PREVIEW_CHARS {
                    format!("{}...", truncate_chars(&s.answer, PREVIEW_CHARS))
                } else {
                    s.answer
                };
                SimilarQuery {
                    doc_id: s.id.to_string(),
                    cached_query: s.query,
                    similarity: s.similarity,
                    summary_preview,
                }
            })
            .collect();
        Ok(CacheSimilarOutcome {
            query: query.to_string(),
            threshold,
            total_cached_queries: total,
            similar_count: similar.len(),
            similar_queries: similar,
        })
    }
}
