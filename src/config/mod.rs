// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Runtime configuration
//!
//! Loaded once from environment variables at process start; every tuning
//! knob here is also overridable per call (`QuerySpec`, compressor budget
//! argument).

use std::env;

use crate::compress::ReorderPolicy;
use crate::pipeline::search::{DEFAULT_LIMIT, DEFAULT_NUM_CANDIDATES};
use crate::store::collection::SimilarityMetric;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    OpenAi,
    Jina,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub num_candidates: usize,
    pub limit: usize,
    pub similarity: SimilarityMetric,
}

#[derive(Debug, Clone)]
pub struct CompressionSettings {
    pub target_tokens: usize,
    pub ratio: f32,
    pub reorder: ReorderPolicy,
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct CollectionSettings {
    pub collection: String,
    pub index_name: String,
    /// separate index carrying the pre-filter field declarations
    pub pre_filter_index_name: String,
    pub embedding_field: String,
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub embedding: EmbeddingSettings,
    pub search: SearchSettings,
    pub compression: CompressionSettings,
    pub generation: GenerationSettings,
    pub collection: CollectionSettings,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingSettings {
                backend: EmbeddingBackend::OpenAi,
                api_url: None,
                api_key: None,
                model: "text-embedding-3-small".to_string(),
                dimensions: 1536,
                timeout_ms: 30_000,
            },
            search: SearchSettings {
                num_candidates: DEFAULT_NUM_CANDIDATES,
                limit: DEFAULT_LIMIT,
                similarity: SimilarityMetric::Cosine,
            },
            compression: CompressionSettings {
                target_tokens: 500,
                ratio: 0.4,
                reorder: ReorderPolicy::Relevance,
            },
            generation: GenerationSettings {
                api_url: None,
                api_key: None,
                model: "gpt-3.5-turbo".to_string(),
            },
            collection: CollectionSettings {
                collection: "listings_reviews".to_string(),
                index_name: "listings_text_vector_idx".to_string(),
                pre_filter_index_name: "listings_text_vector_with_filter_idx".to_string(),
                embedding_field: crate::documents::EMBEDDING_FIELD.to_string(),
            },
        }
    }
}

impl RagConfig {
    /// Load configuration from environment variables, falling back to the
    /// reference defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(backend) = env::var("EMBEDDING_BACKEND") {
            match backend.to_lowercase().as_str() {
                "jina" => {
                    config.embedding.backend = EmbeddingBackend::Jina;
                    config.embedding.model = "jina-embeddings-v3".to_string();
                    config.embedding.dimensions = 1024;
                }
                _ => config.embedding.backend = EmbeddingBackend::OpenAi,
            }
        }
        config.embedding.api_url = env::var("EMBEDDINGS_API_URL").ok();
        config.embedding.api_key = env::var("OPENAI_API_KEY")
            .or_else(|_| env::var("JINA_EMBEDDINGS_BEARER_TOKEN"))
            .ok();
        if let Ok(model) = env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(dims) = read_env("EMBEDDING_DIMENSIONS") {
            config.embedding.dimensions = dims;
        }

        if let Some(n) = read_env("SEARCH_NUM_CANDIDATES") {
            config.search.num_candidates = n;
        }
        if let Some(k) = read_env("SEARCH_LIMIT") {
            config.search.limit = k;
        }

        if let Some(tokens) = read_env("COMPRESSION_TARGET_TOKENS") {
            config.compression.target_tokens = tokens;
        }
        if let Ok(ratio) = env::var("COMPRESSION_RATIO") {
            if let Ok(ratio) = ratio.parse() {
                config.compression.ratio = ratio;
            }
        }
        if let Ok(policy) = env::var("COMPRESSION_REORDER") {
            config.compression.reorder = match policy.to_lowercase().as_str() {
                "original" => ReorderPolicy::Original,
                _ => ReorderPolicy::Relevance,
            };
        }

        config.generation.api_url = env::var("GENERATION_API_URL").ok();
        config.generation.api_key = env::var("OPENAI_API_KEY").ok();
        if let Ok(model) = env::var("GENERATION_MODEL") {
            config.generation.model = model;
        }

        if let Ok(collection) = env::var("LISTINGS_COLLECTION") {
            config.collection.collection = collection;
        }
        if let Ok(index) = env::var("LISTINGS_INDEX_NAME") {
            config.collection.index_name = index;
        }

        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimensions == 0 {
            return Err("embedding dimensions must be greater than 0".to_string());
        }
        if self.search.limit == 0 {
            return Err("search limit must be greater than 0".to_string());
        }
        if self.search.num_candidates < self.search.limit {
            return Err("num_candidates must be at least the search limit".to_string());
        }
        if self.compression.target_tokens == 0 {
            return Err("compression target tokens must be greater than 0".to_string());
        }
        if !(0.0..1.0).contains(&self.compression.ratio) {
            return Err("compression ratio must be in [0, 1)".to_string());
        }
        if self.collection.index_name == self.collection.pre_filter_index_name {
            return Err("plain and pre-filter index names must differ".to_string());
        }
        Ok(())
    }
}

fn read_env(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.search.num_candidates, 150);
        assert_eq!(config.search.limit, 20);
        assert_eq!(config.compression.target_tokens, 500);
    }

    #[test]
    fn test_validate_rejects_candidates_below_limit() {
        let mut config = RagConfig::default();
        config.search.num_candidates = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_ratio() {
        let mut config = RagConfig::default();
        config.compression.ratio = 1.0;
        assert!(config.validate().is_err());
    }
}
