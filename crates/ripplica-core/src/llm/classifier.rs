//! Query classification via an external chat model

use super::cache::{classification_cache_key, TtlCache};
use super::{ChatMessage, ChatOptions, ClassificationVerdict, Classifier, LLMClient, QueryIntent};
use crate::config::ClassifierConfig;
use crate::error::{Result, RipplicaError};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};

lazy_static! {
    static ref INTENT_RULES: Vec<(QueryIntent, Regex)> = vec![
        (QueryIntent::HowTo, Regex::new(r"\b(how to|how do|steps to|guide)\b").unwrap()),
        (QueryIntent::Comparison, Regex::new(r"\b(compare|vs|versus|difference)\b").unwrap()),
        (QueryIntent::Definition, Regex::new(r"\b(what is|define|explain|meaning)\b").unwrap()),
        (QueryIntent::NewsCurrentEvents, Regex::new(r"\b(latest|news|recent|current)\b").unwrap()),
        (QueryIntent::Recommendation, Regex::new(r"\b(best|recommend|top|suggest)\b").unwrap()),
        (QueryIntent::StatisticsData, Regex::new(r"\b(statistics|data|numbers|percentage)\b").unwrap()),
    ];

    static ref TIME_SENSITIVE_HINT: Regex = Regex::new(
        r"\b(today|tonight|tomorrow|yesterday|now|currently|current|latest|recent|recently|this (week|month|year)|breaking|live|news|weather|stock price|score)\b"
    ).unwrap();
}

const SYSTEM_PROMPT: &str = "You are a query classifier for a research assistant. \
Answer with exactly two words separated by a space: VALID or INVALID, then TIME_SENSITIVE or TIMELESS.";

/// Classifier backed by an OpenAI-compatible chat endpoint
pub struct HttpClassifier {
    client: Arc<dyn LLMClient>,
    options: ChatOptions,
    timeout: Duration,
    cache: TtlCache<String, ClassificationVerdict>,
    model: String,
}

impl HttpClassifier {
    pub fn new(client: Arc<dyn LLMClient>, config: &ClassifierConfig) -> Self {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| client.model_name().to_string());
        Self {
            options: ChatOptions {
                model: config.model.clone(),
                temperature: 0.1,
                max_tokens: 8,
            },
            timeout: config.timeout(),
            cache: TtlCache::new(config.cache_capacity, config.cache_ttl()),
            model,
            client,
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, query: &str) -> Result<ClassificationVerdict> {
        if query.trim().is_empty() {
            return Ok(ClassificationVerdict::invalid(
                1.0,
                QueryIntent::EmptyQuery,
                "Query is empty or contains only whitespace",
            ));
        }

        let key = classification_cache_key(query);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("Classification cache hit for '{}'", query);
            return Ok(cached);
        }

        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_classification_prompt(query)),
        ];

        let raw = tokio::time::timeout(
            self.timeout,
            self.client.chat_completion(messages, &self.options),
        )
        .await
        .map_err(|_| {
            RipplicaError::Classification(format!(
                "classifier timed out after {}s",
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| RipplicaError::Classification(e.to_string()))?;

        let mut verdict = parse_verdict(&raw, query);
        verdict.inference_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Query '{}' classified as {} (confidence: {:.2}, intent: {}, time_sensitive: {}, {}ms)",
            query,
            if verdict.is_valid { "VALID" } else { "INVALID" },
            verdict.confidence,
            verdict.intent,
            verdict.is_time_sensitive,
            verdict.inference_time_ms
        );

        self.cache.set(key, verdict.clone());
        Ok(verdict)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn build_classification_prompt(query: &str) -> String {
    format!(
        r#"Classify the query on two axes.

1. VALID (seeks information, knowledge, explanations or guidance) or INVALID (an action command or nonsense).
   VALID: "What is machine learning?", "How to learn Python?", "iPhone vs Android", "Best laptops for programming"
   INVALID: "Set alarm for 6am", "Call my mom", "Book a hotel", "Remind me to buy milk", "hello", "walk my apples for my dog"

2. TIME_SENSITIVE (the right answer depends on current or real-time information) or TIMELESS.
   TIME_SENSITIVE: "What is the weather today?", "Latest AI news", "Current Bitcoin price"
   TIMELESS: "How to make bread?", "Compare electric vs gas cars"

Examples:
Query: "What is the weather today?" -> VALID TIME_SENSITIVE
Query: "Set alarm for 5pm" -> INVALID TIMELESS
Query: "Compare electric vs gas cars" -> VALID TIMELESS
Query: "Book flight to Paris" -> INVALID TIMELESS

Query: "{}"
Answer:"#,
        query
    )
}

/// Turn a raw model reply into a verdict.
///
/// The reply is read case-insensitively. It must name VALID without INVALID to
/// admit the query; anything unrecognizable is rejected at half confidence.
pub fn parse_verdict(raw: &str, query: &str) -> ClassificationVerdict {
    let upper = raw.trim().to_uppercase();

    if upper.contains("INVALID") {
        return ClassificationVerdict::invalid(
            0.9,
            QueryIntent::InvalidQuery,
            "Classified as INVALID",
        );
    }
    if !upper.contains("VALID") {
        return ClassificationVerdict::invalid(
            0.5,
            QueryIntent::UnclearResponse,
            format!("Unclear classifier response: '{}'", raw.trim()),
        );
    }

    let is_time_sensitive = if upper.contains("TIME_SENSITIVE") || upper.contains("TIME-SENSITIVE")
    {
        true
    } else if upper.contains("TIMELESS") {
        false
    } else {
        looks_time_sensitive(query)
    };

    ClassificationVerdict {
        reasoning: format!(
            "Classified as VALID ({})",
            if is_time_sensitive { "time-sensitive" } else { "timeless" }
        ),
        ..ClassificationVerdict::valid(is_time_sensitive, determine_intent(query))
    }
}

/// Keyword heuristic for the intent of an admitted query
pub fn determine_intent(query: &str) -> QueryIntent {
    let lower = query.to_lowercase();
    INTENT_RULES
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .map(|(intent, _)| *intent)
        .unwrap_or(if query.contains('?') {
            QueryIntent::FactualQuestion
        } else {
            QueryIntent::Other
        })
}

/// Used only when the model omits the time axis
pub fn looks_time_sensitive(query: &str) -> bool {
    TIME_SENSITIVE_HINT.is_match(&query.to_lowercase())
}
