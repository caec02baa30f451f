// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Staged vector-retrieval pipeline
//!
//! One invocation per user query: embed the query text, run the ANN
//! search stage with its query-time pre-filter, apply the post stages in
//! order, and materialize a bounded result set. An empty hit set is an
//! explicit non-error result, distinct from every `SearchError`.

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::generation::GenerationError;
use crate::pipeline::stages::{PostStage, Predicate, ScoredDocument};
use crate::store::collection::{
    CollectionStore, PlanStats, SearchPlan, StoreError, VectorSearchStage,
};

pub const DEFAULT_LIMIT: usize = 20;
pub const DEFAULT_NUM_CANDIDATES: usize = 150;

/// One retrieval query: text plus search tuning and the ordered
/// post-processing chain.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub query_text: String,
    /// result count after the ANN stage (the limit cut)
    pub k: usize,
    /// ANN breadth: candidates examined before pre-filter and limit
    pub num_candidates: usize,
    /// query-time pre-filter over fields declared on the index
    pub filter: Predicate,
    /// post stages, applied strictly in order
    pub additional_stages: Vec<PostStage>,
    /// collect per-stage execution statistics as a side effect
    pub record_stats: bool,
}

impl QuerySpec {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            k: DEFAULT_LIMIT,
            num_candidates: DEFAULT_NUM_CANDIDATES,
            filter: Predicate::unrestricted(),
            additional_stages: Vec::new(),
            record_stats: false,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_num_candidates(mut self, num_candidates: usize) -> Self {
        self.num_candidates = num_candidates;
        self
    }

    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_stages(mut self, stages: Vec<PostStage>) -> Self {
        self.additional_stages = stages;
        self
    }
}

/// Ordered retrieval hits plus optional execution statistics. An empty
/// document list is the valid "no response" outcome.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub documents: Vec<ScoredDocument>,
    pub stats: Option<PlanStats>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }
}

/// Per-request pipeline failures, identifying the failing stage. None of
/// these are fatal to the hosting process.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("store query failed: {0}")]
    Store(#[from] StoreError),

    #[error("answer generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("search cancelled")]
    Cancelled,
}

/// Executes staged retrieval queries against one collection store.
pub struct RetrievalPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn CollectionStore>,
}

impl RetrievalPipeline {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn CollectionStore>) -> Self {
        Self { embedder, store }
    }

    /// Run one query. Steps are strictly ordered: embed, build the ANN
    /// stage, append the post stages, execute, materialize. An embedding
    /// failure aborts the search; there is no degraded text-only path.
    pub async fn search(
        &self,
        collection: &str,
        index_name: &str,
        embedding_field: &str,
        query: &QuerySpec,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult, SearchError> {
        let start = Instant::now();

        let query_vector = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
            vector = self.embedder.embed(&query.query_text) => vector?,
        };

        let plan = SearchPlan {
            vector_stage: VectorSearchStage {
                index_name: index_name.to_string(),
                query_vector,
                path: embedding_field.to_string(),
                num_candidates: query.num_candidates,
                limit: query.k,
                filter: query.filter.clone(),
            },
            post_stages: query.additional_stages.clone(),
        };
        debug!(
            collection,
            index = index_name,
            k = query.k,
            num_candidates = query.num_candidates,
            post_stages = plan.post_stages.len(),
            "executing staged search"
        );

        let documents = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
            hits = self.store.aggregate(collection, &plan) => hits?,
        };

        // Observability side effect only: an explain failure is logged
        // and never fails the search.
        let stats = if query.record_stats {
            match self.store.explain(collection, &plan).await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!(collection, index = index_name, "explain failed: {e}");
                    None
                }
            }
        } else {
            None
        };

        info!(
            collection,
            index = index_name,
            hits = documents.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search complete"
        );
        Ok(RetrievalResult { documents, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_spec_defaults() {
        let spec = QuerySpec::new("warm place near restaurants");
        assert_eq!(spec.k, 20);
        assert_eq!(spec.num_candidates, 150);
        assert!(spec.filter.is_unrestricted());
        assert!(spec.additional_stages.is_empty());
        assert!(!spec.record_stats);
    }

    #[test]
    fn test_empty_result_is_not_an_error() {
        let result = RetrievalResult {
            documents: vec![],
            stats: None,
        };
        assert!(result.is_empty());
        assert_eq!(result.len(), 0);
    }
}
