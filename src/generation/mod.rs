// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Answer generation
//!
//! The pipeline treats answer generation as an opaque, possibly slow,
//! network-bound collaborator: given a query and a context string it
//! returns a natural-language answer. No retry policy lives here.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation provider failure ({status:?}): {message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },

    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation returned no completion")]
    EmptyCompletion,
}

/// Trait for answer-generation backends
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, query: &str, context: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct ChatGeneratorConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub system_prompt: String,
    pub timeout_ms: u64,
}

impl Default for ChatGeneratorConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            system_prompt: "You are a listing recommendation system.".to_string(),
            timeout_ms: 60_000,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Chat-completions backend for answer generation.
pub struct ChatCompletionsGenerator {
    client: Client,
    config: ChatGeneratorConfig,
}

impl ChatCompletionsGenerator {
    pub fn new(config: ChatGeneratorConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl AnswerGenerator for ChatCompletionsGenerator {
    async fn generate(&self, query: &str, context: &str) -> Result<String, GenerationError> {
        let user_content =
            format!("Answer this user query: {query} with the following context:\n{context}");
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user_content,
                },
            ],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(GenerationError::Provider {
                status: Some(status.as_u16()),
                message,
            });
        }

        let body: ChatResponse = response.json().await?;
        let answer = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(GenerationError::EmptyCompletion)?;
        debug!(model = %self.config.model, chars = answer.len(), "answer generated");
        Ok(answer)
    }
}
