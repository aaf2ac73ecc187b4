//! Answer synthesis via an external chat model

use super::{ChatMessage, ChatOptions, LLMClient, Summarizer};
use crate::config::SummarizerConfig;
use crate::error::{Result, RipplicaError};
use async_trait::async_trait;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a world-class expert writer and summarizer. \
Format your responses using ONLY simple Markdown with clear headings and plain text. \
Use ONLY headings (#, ##, ###) and plain text paragraphs. \
DO NOT use tables, code blocks, bullet points, numbered lists, bold, italic, or any other Markdown formatting. \
Focus on clear, readable content with a logical heading structure.";

/// Summarizer backed by an OpenAI-compatible chat endpoint
pub struct HttpSummarizer {
    client: Arc<dyn LLMClient>,
    options: ChatOptions,
    model: String,
}

impl HttpSummarizer {
    pub fn new(client: Arc<dyn LLMClient>, config: &SummarizerConfig) -> Self {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| client.model_name().to_string());
        Self {
            options: ChatOptions {
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
            model,
            client,
        }
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, texts: &[String], query: &str) -> Result<String> {
        if texts.is_empty() {
            return Err(RipplicaError::InvalidInput(
                "nothing to summarize".to_string(),
            ));
        }

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_summary_prompt(texts, query)),
        ];

        let summary = self
            .client
            .chat_completion(messages, &self.options)
            .await?
            .trim()
            .to_string();

        if summary.is_empty() {
            return Err(RipplicaError::Llm("summarizer returned no text".to_string()));
        }
        Ok(summary)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn build_summary_prompt(texts: &[String], query: &str) -> String {
    format!(
        "Question: {}\n\n\
         Carefully read the following focused content extracted from multiple sources. \
         Write a comprehensive, detailed and well-structured answer to the user's question. \
         Format your response using Markdown with appropriate headings. \
         If relevant, include main debates, viewpoints, context, definitions, and a high-level synthesis.\n\n\
         CONTENT:\n{}\n\n===\n\nANSWER (in Markdown format):\n",
        query,
        texts.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_carries_query_and_sources() {
        let prompt = build_summary_prompt(
            &["first source".to_string(), "second source".to_string()],
            "Compare electric vs gas cars",
        );
        assert!(prompt.starts_with("Question: Compare electric vs gas cars"));
        assert!(prompt.contains("first source\nsecond source"));
        assert!(prompt.ends_with("ANSWER (in Markdown format):\n"));
    }
}
