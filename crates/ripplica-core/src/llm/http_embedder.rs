//! Query embedder over the model service's embeddings endpoint

use super::{Embedder, LLMClient};
use crate::error::{Result, RipplicaError};
use async_trait::async_trait;
use std::sync::Arc;

/// Embeds queries for cache lookup and storage
pub struct HttpEmbedder {
    client: Arc<dyn LLMClient>,
}

impl HttpEmbedder {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }
}

/// Reject vectors that cannot take part in cosine similarity
fn usable(vector: Vec<f32>) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(RipplicaError::Embedding(
            "embedding service returned an empty vector".to_string(),
        ));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(RipplicaError::Embedding(
            "embedding contains non-finite values".to_string(),
        ));
    }
    Ok(vector)
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        usable(self.client.embed(text).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.client
            .embed_batch(texts)
            .await?
            .into_iter()
            .map(usable)
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.client.embedding_dimensions()
    }

    fn model_name(&self) -> &str {
        self.client.model_name()
    }
}
