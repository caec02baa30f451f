// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Generic text-embedding API backend (OpenAI-style wire format)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::provider::{require_text, EmbeddingError, EmbeddingProvider};

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingsConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_ms: u64,
    /// idle pooled connections are recycled after this period
    pub pool_idle_timeout_ms: u64,
}

impl Default for OpenAiEmbeddingsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/embeddings".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            timeout_ms: 30_000,
            pool_idle_timeout_ms: 300_000,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a str,
    model: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Text-embedding backend speaking the OpenAI embeddings wire format.
pub struct OpenAiEmbeddings {
    client: Client,
    config: OpenAiEmbeddingsConfig,
}

impl OpenAiEmbeddings {
    pub fn new(config: OpenAiEmbeddingsConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_idle_timeout(Duration::from_millis(config.pool_idle_timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        require_text(text)?;

        let request = EmbeddingsRequest {
            input: text,
            model: &self.config.model,
            dimensions: self.config.dimensions,
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
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(EmbeddingError::Provider {
                status: Some(status.as_u16()),
                message,
            });
        }

        let body: EmbeddingsResponse = response.json().await?;
        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Provider {
                status: None,
                message: "response contained no embedding".to_string(),
            })?;
        if embedding.len() != self.config.dimensions {
            return Err(EmbeddingError::Provider {
                status: None,
                message: format!(
                    "expected {}-dimensional embedding, got {}",
                    self.config.dimensions,
                    embedding.len()
                ),
            });
        }
        debug!(model = %self.config.model, dims = embedding.len(), "text embedded");
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}
