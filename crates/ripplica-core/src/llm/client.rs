//! HTTP client for OpenAI-compatible model services (vLLM, OpenAI, Groq, etc.)

use super::cache::{embedding_cache_key, TtlCache, TtlCacheStats};
use crate::config::LLMServiceConfig;
use crate::error::{Result, RipplicaError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const EMBEDDING_CACHE_CAPACITY: usize = 4096;
const EMBEDDING_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Dimensions reported before the first embedding response
const FALLBACK_DIMENSIONS: usize = 384;

/// Trait for model service clients
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
    ) -> Result<String>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embedding_dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call sampling options
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Overrides the configured chat model
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    errors: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    latency_ms: AtomicU64,
}

/// Request counters, as reported by `/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub avg_latency_ms: f64,
    pub embedding_cache: TtlCacheStats,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// Which service a request went to, for error mapping
#[derive(Clone, Copy)]
enum Service {
    Chat,
    Embeddings,
}

impl Service {
    fn error(self, message: String) -> RipplicaError {
        match self {
            Self::Chat => RipplicaError::Llm(message),
            Self::Embeddings => RipplicaError::Embedding(message),
        }
    }
}

/// vLLM/OpenAI-compatible client.
///
/// Embeddings are memoized per model and text. Chat completions are not.
pub struct VLLMClient {
    http_client: reqwest::Client,
    config: LLMServiceConfig,
    /// Configured, or learned from the first embedding response
    dimensions: AtomicUsize,
    embedding_cache: TtlCache<String, Vec<f32>>,
    counters: Arc<Counters>,
}

impl VLLMClient {
    pub fn new(config: LLMServiceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RipplicaError::Http)?;

        Ok(Self {
            http_client,
            dimensions: AtomicUsize::new(config.embedding_dimensions.unwrap_or(0)),
            config,
            embedding_cache: TtlCache::new(EMBEDDING_CACHE_CAPACITY, EMBEDDING_CACHE_TTL),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let total = self.counters.requests.load(Ordering::Relaxed);
        let hits = self.counters.cache_hits.load(Ordering::Relaxed);
        let misses = self.counters.cache_misses.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests: total,
            total_errors: self.counters.errors.load(Ordering::Relaxed),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64 * 100.0
            } else {
                0.0
            },
            avg_latency_ms: if total > 0 {
                self.counters.latency_ms.load(Ordering::Relaxed) as f64 / total as f64
            } else {
                0.0
            },
            embedding_cache: self.embedding_cache.stats(),
        }
    }

    /// POST `body` as JSON and decode the reply. Transport failures, error
    /// statuses and undecodable bodies all count as errors.
    async fn post_json<B, R>(&self, service: Service, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let start = Instant::now();
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        let result = self.send(service, url, body).await;

        self.counters
            .latency_ms
            .fetch_add(start.elapsed().as_millis() as u64, Ordering::Relaxed);
        if result.is_err() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn send<B, R>(&self, service: Service, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.http_client.post(url).json(body);
        if let Some(ref api_key) = self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RipplicaError::Timeout(self.config.timeout_secs * 1000)
            } else {
                service.error(format!("{} unreachable: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(service.error(format!("HTTP {} from {}: {}", status, url, body)));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| service.error(format!("malformed response from {}: {}", url, e)))
    }

    async fn fetch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.config.embeddings_url());
        let request = EmbedRequest {
            model: &self.config.embedding_model,
            input: texts,
        };
        let response: EmbedResponse = self.post_json(Service::Embeddings, &url, &request).await?;

        if response.data.len() != texts.len() {
            return Err(RipplicaError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        let vectors: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
        for vector in &vectors {
            self.check_dimensions(vector.len())?;
        }
        Ok(vectors)
    }

    /// Every vector must match the first one seen; cached similarities
    /// are meaningless across dimensions
    fn check_dimensions(&self, len: usize) -> Result<()> {
        match self
            .dimensions
            .compare_exchange(0, len, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => {
                tracing::debug!("Embedding dimensions detected: {}", len);
                Ok(())
            }
            Err(expected) if expected == len => Ok(()),
            Err(expected) => Err(RipplicaError::Embedding(format!(
                "embedding has {} dimensions, expected {}",
                len, expected
            ))),
        }
    }
}

#[async_trait]
impl LLMClient for VLLMClient {
    async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
    ) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.config.url);
        let request = ChatRequest {
            model: options.model.as_deref().unwrap_or(&self.config.model),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let response: ChatResponse = self.post_json(Service::Chat, &url, &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RipplicaError::Llm("model returned no choices".to_string()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RipplicaError::Embedding("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = &self.config.embedding_model;
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing: Vec<String> = Vec::new();

        for text in texts {
            let cached = self.embedding_cache.get(&embedding_cache_key(model, text));
            let counter = if cached.is_some() {
                &self.counters.cache_hits
            } else {
                missing.push(text.clone());
                &self.counters.cache_misses
            };
            counter.fetch_add(1, Ordering::Relaxed);
            results.push(cached);
        }

        if missing.is_empty() {
            tracing::debug!("All {} embeddings from cache", texts.len());
            return Ok(results.into_iter().flatten().collect());
        }
        tracing::debug!(
            "Embedding batch: {} cached, {} to fetch",
            texts.len() - missing.len(),
            missing.len()
        );

        let mut fetched = self.fetch_embeddings(&missing).await?.into_iter();
        for (text, slot) in texts.iter().zip(results.iter_mut()) {
            if slot.is_none() {
                let vector = fetched.next().unwrap_or_default();
                self.embedding_cache
                    .set(embedding_cache_key(model, text), vector.clone());
                *slot = Some(vector);
            }
        }
        Ok(results.into_iter().flatten().collect())
    }

    fn embedding_dimensions(&self) -> usize {
        match self.dimensions.load(Ordering::Relaxed) {
            0 => FALLBACK_DIMENSIONS,
            n => n,
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dimensions: Option<usize>) -> LLMServiceConfig {
        LLMServiceConfig {
            url: "http://127.0.0.1:1".to_string(),
            model: "m".to_string(),
            embedding_url: None,
            embedding_model: "e".to_string(),
            embedding_dimensions: dimensions,
            api_key: None,
            timeout_secs: 1,
        }
    }

    #[test]
    fn test_chat_message_roles() {
        assert_eq!(ChatMessage::system("x").role, "system");
        assert_eq!(ChatMessage::user("y").role, "user");
    }

    #[test]
    fn test_fresh_metrics() {
        let client = VLLMClient::new(config(Some(8))).unwrap();
        let snapshot = client.metrics();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.cache_hit_rate, 0.0);
        assert_eq!(snapshot.embedding_cache.total_entries, 0);
        assert_eq!(snapshot.embedding_cache.capacity, EMBEDDING_CACHE_CAPACITY);
        assert_eq!(client.embedding_dimensions(), 8);
    }

    #[test]
    fn test_dimensions_learned_once() {
        let client = VLLMClient::new(config(None)).unwrap();
        assert_eq!(client.embedding_dimensions(), FALLBACK_DIMENSIONS);

        client.check_dimensions(1024).unwrap();
        assert_eq!(client.embedding_dimensions(), 1024);
        assert!(client.check_dimensions(1024).is_ok());
        assert!(matches!(
            client.check_dimensions(768),
            Err(RipplicaError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service_counts_error() {
        let client = VLLMClient::new(config(Some(8))).unwrap();
        let err = client.embed("hello").await.unwrap_err();
        assert!(matches!(err, RipplicaError::Embedding(_) | RipplicaError::Timeout(_)));

        let snapshot = client.metrics();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.total_errors, 1);
        assert_eq!(snapshot.cache_misses, 1);
    }
}
