// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Listing document schema and validation
//!
//! Documents are validated against this declared schema before storage.
//! Invalid records are dropped with a reported validation error, never
//! silently coerced into shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Document field holding the text embedding vector
pub const EMBEDDING_FIELD: &str = "text_embeddings";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
    pub is_location_exact: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub government_area: String,
    pub market: String,
    pub country: String,
    pub country_code: String,
    pub location: GeoLocation,
}

/// A lodging listing. Numeric review subscores live under
/// `review_scores`; the boosting chain averages them and blends the
/// average against `number_of_reviews`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood_overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub property_type: String,
    pub room_type: String,
    pub accommodates: i64,
    #[serde(default)]
    pub bedrooms: Option<f64>,
    #[serde(default)]
    pub beds: Option<f64>,
    #[serde(default)]
    pub bathrooms: Option<f64>,
    pub number_of_reviews: i64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_review: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_review: Option<DateTime<Utc>>,
    pub address: Address,
    #[serde(default)]
    pub review_scores: BTreeMap<String, f64>,
    pub text_embeddings: Vec<f32>,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("record {index} does not match the listing schema: {reason}")]
    Schema { index: usize, reason: String },

    #[error("record {index} ({id}) invalid: {reason}")]
    Invalid {
        index: usize,
        id: i64,
        reason: String,
    },
}

impl Listing {
    /// Structural checks beyond the serde schema.
    pub fn validate(&self, expected_dimensions: Option<usize>) -> Result<(), String> {
        if self.text_embeddings.is_empty() {
            return Err("embedding vector is empty".to_string());
        }
        if let Some(dims) = expected_dimensions {
            if self.text_embeddings.len() != dims {
                return Err(format!(
                    "embedding has {} dimensions, expected {dims}",
                    self.text_embeddings.len()
                ));
            }
        }
        if self.text_embeddings.iter().any(|v| !v.is_finite()) {
            return Err("embedding contains non-finite values".to_string());
        }
        if self.accommodates < 1 {
            return Err(format!("accommodates must be positive, got {}", self.accommodates));
        }
        if self.number_of_reviews < 0 {
            return Err(format!(
                "number_of_reviews must be non-negative, got {}",
                self.number_of_reviews
            ));
        }
        Ok(())
    }
}

/// Validate raw records against the listing schema. Valid records come
/// back normalized to the schema shape; invalid ones are dropped and
/// reported, never coerced.
pub fn validate_listings(
    records: Vec<Value>,
    expected_dimensions: Option<usize>,
) -> (Vec<Value>, Vec<ValidationError>) {
    let mut valid = Vec::with_capacity(records.len());
    let mut errors = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        let listing: Listing = match serde_json::from_value(record) {
            Ok(listing) => listing,
            Err(e) => {
                errors.push(ValidationError::Schema {
                    index,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if let Err(reason) = listing.validate(expected_dimensions) {
            errors.push(ValidationError::Invalid {
                index,
                id: listing.id,
                reason,
            });
            continue;
        }
        match serde_json::to_value(&listing) {
            Ok(value) => valid.push(value),
            Err(e) => errors.push(ValidationError::Schema {
                index,
                reason: e.to_string(),
            }),
        }
    }

    for error in &errors {
        warn!("dropping record: {error}");
    }
    (valid, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing_json(id: i64) -> Value {
        json!({
            "_id": id,
            "name": "Ribeira Charming Duplex",
            "summary": "Fantastic duplex apartment with three bedrooms",
            "property_type": "House",
            "room_type": "Entire home/apt",
            "accommodates": 8,
            "bedrooms": 3.0,
            "number_of_reviews": 51,
            "amenities": ["TV", "Wifi"],
            "address": {
                "street": "Porto, Porto, Portugal",
                "government_area": "Cedofeita",
                "market": "Porto",
                "country": "Portugal",
                "country_code": "PT",
                "location": {
                    "type": "Point",
                    "coordinates": [-8.61308, 41.1413],
                    "is_location_exact": false
                }
            },
            "review_scores": {
                "review_scores_accuracy": 9.0,
                "review_scores_value": 9.0
            },
            "text_embeddings": [0.1, 0.2, 0.3]
        })
    }

    #[test]
    fn test_valid_record_passes_and_normalizes() {
        let (valid, errors) = validate_listings(vec![listing_json(1)], Some(3));
        assert_eq!(valid.len(), 1);
        assert!(errors.is_empty());
        assert_eq!(valid[0]["_id"], json!(1));
        assert_eq!(valid[0]["address"]["country"], json!("Portugal"));
    }

    #[test]
    fn test_schema_mismatch_is_dropped_with_report() {
        let mut bad = listing_json(2);
        bad["accommodates"] = json!("four"); // wrong type
        let (valid, errors) = validate_listings(vec![listing_json(1), bad], None);
        assert_eq!(valid.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ValidationError::Schema { index: 1, .. }));
    }

    #[test]
    fn test_dimension_mismatch_is_dropped() {
        let (valid, errors) = validate_listings(vec![listing_json(1)], Some(1536));
        assert!(valid.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("dimensions"));
    }

    #[test]
    fn test_non_finite_embedding_rejected() {
        let mut listing: Listing = serde_json::from_value(listing_json(3)).unwrap();
        listing.text_embeddings = vec![0.1, f32::NAN, 0.3];
        assert!(listing.validate(None).is_err());
    }
}
