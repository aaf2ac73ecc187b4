//! Similarity cache
//!
//! Stores (query, answer) pairs keyed by embedding. A lookup evaluates only
//! the single nearest neighbor and admits it when the blend of semantic and
//! lexical similarity clears the threshold.

mod lexical;
mod store;

pub use lexical::{content_tokens, lexical_score};
pub use store::{
    bytes_to_embedding, cosine_distance, cosine_similarity, embedding_to_bytes, CacheEntry,
    InMemoryVectorStore, Neighbor, SqliteVectorStore, VectorStore,
};

use crate::config::CacheConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Slack on the threshold comparison so identical queries always hit
const ADMISSION_EPSILON: f32 = 1e-6;

/// Weights of the admission formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionWeights {
    pub semantic: f32,
    pub lexical: f32,
    pub jaccard: f32,
    pub overlap: f32,
}

impl Default for AdmissionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            lexical: 0.3,
            jaccard: 0.6,
            overlap: 0.4,
        }
    }
}

impl From<&CacheConfig> for AdmissionWeights {
    fn from(config: &CacheConfig) -> Self {
        Self {
            semantic: config.semantic_weight,
            lexical: config.lexical_weight,
            jaccard: config.jaccard_weight,
            overlap: config.overlap_weight,
        }
    }
}

/// Nearest neighbor with its admission scores
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: CacheEntry,
    pub semantic: f32,
    pub lexical: f32,
    pub combined: f32,
}

/// Result of a threshold check against the nearest neighbor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheCheck {
    pub hit: bool,
    pub similarity: f32,
    pub cached_query: Option<String>,
    pub cached_answer: Option<String>,
}

/// An entry whose semantic similarity cleared a listing threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarEntry {
    pub id: Uuid,
    pub query: String,
    pub similarity: f32,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedQuery {
    pub query: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub count: usize,
    pub entries: Vec<CachedQuery>,
}

/// Similarity cache over a pluggable vector store
pub struct SimilarityCache {
    store: Arc<dyn VectorStore>,
    weights: AdmissionWeights,
}

impl SimilarityCache {
    pub fn new(store: Arc<dyn VectorStore>, weights: AdmissionWeights) -> Self {
        Self { store, weights }
    }

    /// Cache with default weights over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryVectorStore::new()), AdmissionWeights::default())
    }

    pub fn weights(&self) -> AdmissionWeights {
        self.weights
    }

    /// Score the nearest of `top_k` neighbors; `None` when the store is empty
    pub async fn nearest(
        &self,
        query_text: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Option<ScoredEntry>> {
        let neighbors = self.store.nearest(embedding, top_k.max(1)).await?;
        Ok(neighbors
            .into_iter()
            .next()
            .map(|n| self.score(query_text, n)))
    }

    fn score(&self, query_text: &str, neighbor: Neighbor) -> ScoredEntry {
        let semantic = (1.0 - neighbor.distance).clamp(0.0, 1.0);
        let lexical = lexical_score(
            query_text,
            &neighbor.entry.query_text,
            self.weights.jaccard,
            self.weights.overlap,
        );
        let combined =
            (self.weights.semantic * semantic + self.weights.lexical * lexical).clamp(0.0, 1.0);
        ScoredEntry {
            entry: neighbor.entry,
            semantic,
            lexical,
            combined,
        }
    }

    /// The nearest neighbor if its combined score reaches `threshold`
    pub async fn lookup(
        &self,
        query_text: &str,
        embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Option<ScoredEntry>> {
        let Some(scored) = self.nearest(query_text, embedding, top_k).await? else {
            tracing::debug!("Cache empty, miss for '{}'", query_text);
            return Ok(None);
        };

        let hit = admits(scored.combined, threshold);
        tracing::info!(
            "Cache {} for '{}': nearest '{}' (semantic {:.3}, lexical {:.3}, combined {:.3}, threshold {:.2})",
            if hit { "hit" } else { "miss" },
            query_text,
            scored.entry.query_text,
            scored.semantic,
            scored.lexical,
            scored.combined,
            threshold
        );
        Ok(hit.then_some(scored))
    }

    /// Threshold check that always reports the nearest neighbor's score
    pub async fn check(
        &self,
        query_text: &str,
        embedding: &[f32],
        threshold: f32,
    ) -> Result<CacheCheck> {
        Ok(match self.nearest(query_text, embedding, 1).await? {
            Some(scored) => {
                let hit = admits(scored.combined, threshold);
                CacheCheck {
                    hit,
                    similarity: scored.combined,
                    cached_query: Some(scored.entry.query_text),
                    cached_answer: hit.then_some(scored.entry.answer_text),
                }
            }
            None => CacheCheck {
                hit: false,
                similarity: 0.0,
                cached_query: None,
                cached_answer: None,
            },
        })
    }

    /// Every entry whose semantic similarity is at least `threshold`, best first
    pub async fn similar(&self, embedding: &[f32], threshold: f32) -> Result<Vec<SimilarEntry>> {
        let total = self.store.count().await?;
        if total == 0 {
            return Ok(Vec::new());
        }
        let neighbors = self.store.nearest(embedding, total).await?;
        Ok(neighbors
            .into_iter()
            .map(|n| (n.entry, (1.0 - n.distance).clamp(0.0, 1.0)))
            .filter(|(_, sim)| *sim + ADMISSION_EPSILON >= threshold)
            .map(|(entry, similarity)| SimilarEntry {
                id: entry.id,
                query: entry.query_text,
                similarity,
                answer: entry.answer_text,
                timestamp: entry.created_at,
            })
            .collect())
    }

    pub async fn insert(
        &self,
        query_text: &str,
        embedding: Vec<f32>,
        answer_text: &str,
    ) -> Result<CacheEntry> {
        let entry = CacheEntry::new(query_text, embedding, answer_text);
        self.store.insert(entry.clone()).await?;
        tracing::info!("Cached answer for '{}' ({})", query_text, entry.id);
        Ok(entry)
    }

    pub async fn clear(&self) -> Result<usize> {
        let removed = self.store.clear().await?;
        tracing::info!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let entries: Vec<CachedQuery> = self
            .store
            .entries()
            .await?
            .into_iter()
            .map(|e| CachedQuery {
                query: e.query_text,
                timestamp: e.created_at,
            })
            .collect();
        Ok(CacheStats {
            count: entries.len(),
            entries,
        })
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count().await
    }
}

/// Whether a combined score clears `threshold`
pub fn admits(combined: f32, threshold: f32) -> bool {
    combined + ADMISSION_EPSILON >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_cache_misses() {
        let cache = SimilarityCache::in_memory();
        assert!(cache
            .lookup("anything", &[1.0, 0.0], 1, 0.0)
            .await
            .unwrap()
            .is_none());
        let check = cache.check("anything", &[1.0, 0.0], 0.8).await.unwrap();
        assert!(!check.hit);
        assert_eq!(check.cached_query, None);
    }

    #[tokio::test]
    async fn test_identical_query_always_hits() {
        let cache = SimilarityCache::in_memory();
        let embedding = vec![0.3, 0.4, 0.5];
        cache
            .insert("Compare electric vs gas cars", embedding.clone(), "answer")
            .await
            .unwrap();

        let hit = cache
            .lookup("Compare electric vs gas cars", &embedding, 1, 1.0)
            .await
            .unwrap()
            .expect("identical query should hit");
        assert!((hit.combined - 1.0).abs() < 1e-5);
        assert_eq!(hit.entry.answer_text, "answer");
    }

    #[tokio::test]
    async fn test_lexical_term_rejects_adjacent_intent() {
        let cache = SimilarityCache::in_memory();
        cache
            .insert("capital of France", vec![1.0, 0.0], "Paris")
            .await
            .unwrap();

        // Same embedding, different intent: 0.7 * 1.0 + 0.3 * 0.4 = 0.82
        let target = [1.0, 0.0];
        assert!(cache
            .lookup("population of France", &target, 1, 0.9)
            .await
            .unwrap()
            .is_none());
        assert!(cache
            .lookup("population of France", &target, 1, 0.8)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_only_nearest_neighbor_is_evaluated() {
        let cache = SimilarityCache::in_memory();
        // Lexically identical but semantically distant
        cache
            .insert("rust ownership", vec![0.0, 1.0], "far")
            .await
            .unwrap();
        // Semantically nearest but lexically disjoint
        cache
            .insert("borrow checker", vec![1.0, 0.05], "near")
            .await
            .unwrap();

        let scored = cache
            .nearest("rust ownership", &[1.0, 0.0], 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scored.entry.answer_text, "near");
        assert_eq!(scored.lexical, 0.0);
    }

    #[tokio::test]
    async fn test_zero_norm_embedding_scores_zero_semantic() {
        let cache = SimilarityCache::in_memory();
        cache.insert("q", vec![1.0, 0.0], "a").await.unwrap();
        let scored = cache.nearest("q", &[0.0, 0.0], 1).await.unwrap().unwrap();
        assert_eq!(scored.semantic, 0.0);
        assert!((scored.combined - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_similar_and_stats() {
        let cache = SimilarityCache::in_memory();
        cache.insert("a", vec![1.0, 0.0], "x").await.unwrap();
        cache.insert("b", vec![0.0, 1.0], "y").await.unwrap();
        cache.insert("c", vec![1.0, 0.2], "z").await.unwrap();

        let similar = cache.similar(&[1.0, 0.0], 0.7).await.unwrap();
        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].query, "a");
        assert!(similar[0].similarity >= similar[1].similarity);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.entries[0].query, "a");

        assert_eq!(cache.clear().await.unwrap(), 3);
        assert_eq!(cache.count().await.unwrap(), 0);
    }
}
