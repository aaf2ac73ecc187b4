//! Response shapes produced by the pipeline

use crate::cache::CachedQuery;
use crate::error::Failure;
use crate::llm::ClassificationVerdict;
use crate::retrieval::RetrievalResult;
use serde::{Deserialize, Serialize};

/// Summary returned for rejected queries
pub const INVALID_SUMMARY: &str = "Query invalid";

/// Summary returned when retrieval produced nothing to summarize
pub const NO_CONTENT_SUMMARY: &str =
    "No relevant content could be retrieved for this query. Try rephrasing it or asking again later.";

/// Result of one full query run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub valid: bool,
    pub is_valid: bool,
    pub is_time_sensitive: bool,
    pub summary: String,
    pub from_cache: bool,
    pub cached_query: Option<String>,
    pub urls_found: usize,
    pub content_scraped: usize,
    pub scraped_urls: Vec<String>,
    pub processing_time: f64,
    pub search_time: f64,
    pub scrape_time: f64,
    pub extraction_time: f64,
    pub summarization_time: f64,
    pub cache_similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl QueryOutcome {
    pub(crate) fn rejected(
        classification: Option<ClassificationVerdict>,
        failure: Failure,
        processing_time: f64,
    ) -> Self {
        Self {
            summary: INVALID_SUMMARY.to_string(),
            is_time_sensitive: classification
                .as_ref()
                .map(|c| c.is_time_sensitive)
                .unwrap_or(false),
            classification,
            failure: Some(failure),
            processing_time,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOnlyOutcome {
    pub query: String,
    pub urls_found: usize,
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOnlyOutcome {
    pub urls_processed: usize,
    pub successful_scrapes: usize,
    pub results: Vec<RetrievalResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsOutcome {
    pub cache_count: usize,
    pub cached_queries: Vec<CachedQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheCheckOutcome {
    pub query: String,
    pub threshold: f32,
    pub hit: bool,
    pub similarity: f32,
    pub cached_query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheAddOutcome {
    pub success: bool,
    pub doc_id: String,
    pub query: String,
    pub summary_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarQuery {
    pub doc_id: String,
    pub cached_query: String,
    pub similarity: f32,
    pub summary_preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSimilarOutcome {
    pub query: String,
    pub threshold: f32,
    pub total_cached_queries: usize,
    pub similar_count: usize,
    pub similar_queries: Vec<SimilarQuery>,
}
