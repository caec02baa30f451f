// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding provider trait definition

use async_trait::async_trait;
use thiserror::Error;

/// Errors from embedding generation
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Bad input text (empty or whitespace-only). Local to the call; the
    /// caller treats it as "no result", never as fatal.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The backend API reported a failure (rate limit, auth, server
    /// error). No retry is attempted here; retry policy belongs to the
    /// caller.
    #[error("embedding provider failure ({status:?}): {message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },

    /// Transport-level failure (connect, timeout, TLS)
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Trait for text-embedding backends
///
/// Backends turn text into a fixed-dimension vector. The vector length is
/// fixed by provider and model; a mismatch with the index's declared
/// dimensionality is a configuration error caught at index-build time.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Non-empty input is required.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Dimensionality of every vector this provider produces
    fn dimensions(&self) -> usize;

    /// Model identifier for logging
    fn model_id(&self) -> &str;
}

/// Shared input validation for backends
pub(crate) fn require_text(text: &str) -> Result<(), EmbeddingError> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::InvalidInput(
            "query text must be a non-empty string".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text_rejects_empty_and_whitespace() {
        assert!(matches!(
            require_text(""),
            Err(EmbeddingError::InvalidInput(_))
        ));
        assert!(matches!(
            require_text("   \n"),
            Err(EmbeddingError::InvalidInput(_))
        ));
        assert!(require_text("warm place near restaurants").is_ok());
    }
}
