//! Passage extraction via an external chat model

use super::{ChatMessage, ChatOptions, LLMClient, PassageExtractor};
use crate::error::{Result, RipplicaError};
use crate::text::truncate_chars;
use async_trait::async_trait;
use std::sync::Arc;

/// Characters of source text sent to the model
const MAX_INPUT_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You are an expert assistant that extracts only the most relevant \
passages directly answering the given query from the provided content. Keep the original wording \
but remove irrelevant sections. Include supporting details, examples and explanations.";

pub struct HttpPassageExtractor {
    client: Arc<dyn LLMClient>,
    options: ChatOptions,
}

impl HttpPassageExtractor {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            client,
            options: ChatOptions {
                model: None,
                temperature: 0.0,
                max_tokens: 2048,
            },
        }
    }
}

#[async_trait]
impl PassageExtractor for HttpPassageExtractor {
    async fn extract(&self, query: &str, content: &str) -> Result<String> {
        let prompt = format!(
            "QUESTION:\n{}\n\nDOCUMENT:\n{}\n\nReturn only key passages that directly answer the question. \
             Keep the original wording but remove irrelevant content.",
            query,
            truncate_chars(content, MAX_INPUT_CHARS)
        );
        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];

        let passages = self.client.chat_completion(messages, &self.options).await?;
        let passages = passages.trim();
        if passages.is_empty() {
            return Err(RipplicaError::Llm("extractor returned no passages".into()));
        }
        Ok(passages.to_string())
    }
}
