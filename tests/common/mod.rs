// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared test doubles and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

use stayfinder_node::embedding::{EmbeddingError, EmbeddingProvider};
use stayfinder_node::generation::{AnswerGenerator, GenerationError};

/// Opt-in log output for debugging test runs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Deterministic embedder: fixed vectors for registered texts, a
/// hash-seeded unit vector otherwise. Identical text always embeds to the
/// identical vector.
pub struct MockEmbedder {
    dims: usize,
    fixed: HashMap<String, Vec<f32>>,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            fixed: HashMap::new(),
        }
    }

    pub fn with_mapping(dims: usize, pairs: &[(&str, Vec<f32>)]) -> Self {
        let fixed = pairs
            .iter()
            .map(|(text, vector)| (text.to_string(), vector.clone()))
            .collect();
        Self { dims, fixed }
    }

    fn hash_embedding(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut seed = hasher.finish();

        let mut embedding = Vec::with_capacity(self.dims);
        for i in 0..self.dims {
            seed = seed.wrapping_mul(1664525).wrapping_add(1013904223) ^ (i as u64);
            let value = (seed as f64 / u64::MAX as f64) * 2.0 - 1.0;
            embedding.push(value as f32);
        }
        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "query text must be a non-empty string".to_string(),
            ));
        }
        if let Some(vector) = self.fixed.get(text) {
            return Ok(vector.clone());
        }
        Ok(self.hash_embedding(text))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_id(&self) -> &str {
        "mock-embedder"
    }
}

/// Embedder whose backend is permanently down.
pub struct FailingEmbedder {
    pub dims: usize,
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Provider {
            status: Some(429),
            message: "rate limited".to_string(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_id(&self) -> &str {
        "failing-embedder"
    }
}

/// Generator echoing the context it saw, so tests can observe what the
/// pipeline handed to generation.
pub struct MockGenerator;

#[async_trait]
impl AnswerGenerator for MockGenerator {
    async fn generate(&self, query: &str, context: &str) -> Result<String, GenerationError> {
        let snippet: String = context.chars().take(40).collect();
        Ok(format!(
            "answer to '{}' | context[{}]: {}",
            query,
            context.len(),
            snippet
        ))
    }
}

/// Generator whose backend is permanently down.
pub struct FailingGenerator;

#[async_trait]
impl AnswerGenerator for FailingGenerator {
    async fn generate(&self, _query: &str, _context: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Provider {
            status: Some(503),
            message: "backend unavailable".to_string(),
        })
    }
}

/// A listing with uniform review subscores and a review count.
pub fn reviewed_listing_doc(
    id: i64,
    name: &str,
    subscore: f64,
    review_count: i64,
    emb: Vec<f32>,
) -> Value {
    let mut doc = listing_doc(id, name, "United States", 2, emb);
    doc["number_of_reviews"] = json!(review_count);
    doc["review_scores"] = json!({
        "review_scores_accuracy": subscore,
        "review_scores_cleanliness": subscore,
        "review_scores_checkin": subscore,
        "review_scores_communication": subscore,
        "review_scores_location": subscore,
        "review_scores_value": subscore
    });
    doc
}

/// A small listing document carrying a hand-built embedding.
pub fn listing_doc(id: i64, name: &str, country: &str, accommodates: i64, emb: Vec<f32>) -> Value {
    json!({
        "_id": id,
        "name": name,
        "summary": format!("{name} in {country}"),
        "property_type": "Apartment",
        "room_type": "Entire home/apt",
        "accommodates": accommodates,
        "bedrooms": 2.0,
        "number_of_reviews": 10,
        "amenities": ["Wifi"],
        "address": {
            "street": format!("Main street, {country}"),
            "government_area": "Central",
            "market": "Downtown",
            "country": country,
            "country_code": "XX",
            "location": {
                "type": "Point",
                "coordinates": [0.0, 0.0],
                "is_location_exact": true
            }
        },
        "review_scores": {
            "review_scores_accuracy": 9.0,
            "review_scores_cleanliness": 9.0,
            "review_scores_checkin": 9.0,
            "review_scores_communication": 9.0,
            "review_scores_location": 9.0,
            "review_scores_value": 9.0
        },
        "text_embeddings": emb
    })
}
