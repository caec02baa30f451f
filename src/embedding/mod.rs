// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Text-embedding backends
//!
//! Two interchangeable backends behind the `EmbeddingProvider` trait: a
//! generic text-embedding API and a multilingual embedding API. Backend
//! selection happens once, from configuration, not at call sites.

pub mod jina;
pub mod openai;
pub mod provider;

pub use jina::{JinaEmbeddings, JinaEmbeddingsConfig};
pub use openai::{OpenAiEmbeddings, OpenAiEmbeddingsConfig};
pub use provider::{EmbeddingError, EmbeddingProvider};

use crate::config::{EmbeddingBackend, EmbeddingSettings};
use std::sync::Arc;

/// Construct the configured embedding backend.
pub fn provider_from_settings(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match settings.backend {
        EmbeddingBackend::OpenAi => {
            let defaults = OpenAiEmbeddingsConfig::default();
            let provider = OpenAiEmbeddings::new(OpenAiEmbeddingsConfig {
                api_url: settings.api_url.clone().unwrap_or(defaults.api_url),
                api_key: settings.api_key.clone().unwrap_or_default(),
                model: settings.model.clone(),
                dimensions: settings.dimensions,
                timeout_ms: settings.timeout_ms,
                pool_idle_timeout_ms: defaults.pool_idle_timeout_ms,
            })?;
            Ok(Arc::new(provider))
        }
        EmbeddingBackend::Jina => {
            let defaults = JinaEmbeddingsConfig::default();
            let provider = JinaEmbeddings::new(JinaEmbeddingsConfig {
                api_url: settings.api_url.clone().unwrap_or(defaults.api_url),
                api_key: settings.api_key.clone().unwrap_or_default(),
                model: settings.model.clone(),
                dimensions: settings.dimensions,
                timeout_ms: settings.timeout_ms,
                pool_idle_timeout_ms: defaults.pool_idle_timeout_ms,
            })?;
            Ok(Arc::new(provider))
        }
    }
}
