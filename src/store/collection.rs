// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Document-store capability trait
//!
//! The store surface the retrieval pipeline runs against: bulk document
//! mutation, ANN search-index lifecycle, staged aggregate execution, and a
//! dry `explain` mode that reports per-stage execution statistics without
//! materializing results. Backends implement this trait; callers hold an
//! `Arc<dyn CollectionStore>` constructed once at process start.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::pipeline::stages::{PostStage, Predicate, ScoredDocument};

/// Declared type of an attribute available for query-time pre-filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterFieldType {
    Number,
    String,
    Boolean,
}

/// Similarity metric for ANN search. The wire format admits exactly one
/// value today; the enum keeps the descriptor closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
}

/// Specification of an ANN search index over one embedding field,
/// optionally declaring attribute fields usable as query-time pre-filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    pub index_name: String,
    pub embedding_field: String,
    pub dimensions: usize,
    pub similarity: SimilarityMetric,
    /// field name -> declared type; a declared field absent from indexed
    /// documents makes filtered queries on it return no matches, not error
    pub pre_filter_fields: BTreeMap<String, FilterFieldType>,
}

impl IndexSpec {
    pub fn new(
        index_name: impl Into<String>,
        embedding_field: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            index_name: index_name.into(),
            embedding_field: embedding_field.into(),
            dimensions,
            similarity: SimilarityMetric::Cosine,
            pre_filter_fields: BTreeMap::new(),
        }
    }

    pub fn with_pre_filter(mut self, field: impl Into<String>, ty: FilterFieldType) -> Self {
        self.pre_filter_fields.insert(field.into(), ty);
        self
    }
}

/// Build state of a search index as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexStatus {
    Building,
    Ready,
    Failed(String),
}

/// The ANN stage of an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchStage {
    pub index_name: String,
    pub query_vector: Vec<f32>,
    /// document field holding the indexed embeddings
    pub path: String,
    /// ANN breadth: candidates examined before the limit cut
    pub num_candidates: usize,
    pub limit: usize,
    /// query-time pre-filter over declared filter fields
    pub filter: Predicate,
}

/// Full staged execution plan: one vector-search stage followed by zero or
/// more post-retrieval stages applied in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPlan {
    pub vector_stage: VectorSearchStage,
    pub post_stages: Vec<PostStage>,
}

/// Per-stage execution statistics from `explain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStats {
    pub stage: String,
    pub candidates_examined: usize,
    pub returned: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStats {
    pub stages: Vec<StageStats>,
    pub total_elapsed_ms: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("search index '{index}' not found on collection '{collection}'")]
    IndexNotFound { collection: String, index: String },

    #[error("search index '{index}' already exists")]
    IndexAlreadyExists { index: String },

    #[error("search index '{index}' is not ready")]
    IndexNotReady { index: String },

    #[error("search index '{index}' does not cover path '{path}'")]
    PathNotIndexed { index: String, path: String },

    #[error("dimension mismatch on index '{index}': expected {expected}, got {actual}")]
    DimensionMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },

    #[error("filter references field '{field}' not declared as a pre-filter on index '{index}'")]
    UnindexedFilterField { index: String, field: String },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Document store with ANN index lifecycle and staged query execution.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Full collection replace: delete everything, then insert the given
    /// documents. Returns the number of documents inserted.
    async fn replace_all(&self, collection: &str, documents: Vec<Value>)
        -> Result<usize, StoreError>;

    async fn insert_many(&self, collection: &str, documents: Vec<Value>)
        -> Result<usize, StoreError>;

    async fn delete_all(&self, collection: &str) -> Result<usize, StoreError>;

    async fn count(&self, collection: &str) -> Result<usize, StoreError>;

    /// Names of search indexes on the collection (empty when the
    /// collection does not exist yet).
    async fn list_search_indexes(&self, collection: &str) -> Result<Vec<String>, StoreError>;

    /// Submit an index build. Errors with `IndexAlreadyExists` when the
    /// name is taken; callers wanting idempotence list first.
    async fn create_search_index(
        &self,
        collection: &str,
        spec: &IndexSpec,
    ) -> Result<(), StoreError>;

    async fn search_index_status(
        &self,
        collection: &str,
        index_name: &str,
    ) -> Result<IndexStatus, StoreError>;

    /// Execute the staged plan and materialize the bounded result set.
    async fn aggregate(
        &self,
        collection: &str,
        plan: &SearchPlan,
    ) -> Result<Vec<ScoredDocument>, StoreError>;

    /// Run the plan for its execution statistics only.
    async fn explain(&self, collection: &str, plan: &SearchPlan) -> Result<PlanStats, StoreError>;
}
