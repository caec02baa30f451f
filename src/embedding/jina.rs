// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multilingual embedding API backend (Jina-style wire format)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::provider::{require_text, EmbeddingError, EmbeddingProvider};

#[derive(Debug, Clone)]
pub struct JinaEmbeddingsConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_ms: u64,
    pub pool_idle_timeout_ms: u64,
}

impl Default for JinaEmbeddingsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.jina.ai/v1/embeddings".to_string(),
            api_key: String::new(),
            model: "jina-embeddings-v3".to_string(),
            dimensions: 1024,
            timeout_ms: 30_000,
            pool_idle_timeout_ms: 300_000,
        }
    }
}

#[derive(Serialize)]
struct JinaRequest<'a> {
    model: &'a str,
    task: &'a str,
    dimensions: usize,
    late_chunking: bool,
    embedding_type: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct JinaResponse {
    data: Vec<JinaEmbedding>,
}

#[derive(Deserialize)]
struct JinaEmbedding {
    embedding: Vec<f32>,
}

/// Multilingual text-matching embeddings.
pub struct JinaEmbeddings {
    client: Client,
    config: JinaEmbeddingsConfig,
}

impl JinaEmbeddings {
    pub fn new(config: JinaEmbeddingsConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_idle_timeout(Duration::from_millis(config.pool_idle_timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmbeddingProvider for JinaEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        require_text(text)?;

        let request = JinaRequest {
            model: &self.config.model,
            task: "text-matching",
            dimensions: self.config.dimensions,
            late_chunking: false,
            embedding_type: "float",
            input: vec![text],
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
            return Err(EmbeddingError::Provider {
                status: Some(status.as_u16()),
                message,
            });
        }

        let body: JinaResponse = response.json().await?;
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
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}
