// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ANN search-index lifecycle
//!
//! `ensure_index` is idempotent: re-creating an existing index name is a
//! no-op reported as `AlreadyExists`, never an in-place update. After
//! submission the manager polls the store until the index reports ready,
//! with exponential backoff and a bounded timeout, because ANN indexes
//! are not instantly queryable after creation. This is the single
//! blocking multi-second operation in the core; run it off the query
//! path.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::store::collection::{CollectionStore, IndexSpec, IndexStatus, StoreError};

/// Outcome of an idempotent index build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum IndexBuildError {
    #[error("index build failed: {0}")]
    Store(#[from] StoreError),

    #[error("index '{index}' build failed: {reason}")]
    Failed { index: String, reason: String },

    #[error("index '{index}' not ready after {waited_ms}ms")]
    Timeout { index: String, waited_ms: u64 },

    #[error("embedding dimensionality mismatch: provider produces {provider}, index declares {declared}")]
    DimensionMismatch { provider: usize, declared: usize },

    #[error("index build cancelled")]
    Cancelled,
}

/// Readiness-poll tuning
#[derive(Debug, Clone)]
pub struct IndexBuildOptions {
    /// first poll delay; doubles on every subsequent poll
    pub initial_poll_interval: Duration,
    /// backoff ceiling
    pub max_poll_interval: Duration,
    /// total wait budget before reporting a build timeout
    pub max_wait: Duration,
}

impl Default for IndexBuildOptions {
    fn default() -> Self {
        Self {
            initial_poll_interval: Duration::from_millis(200),
            max_poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(120),
        }
    }
}

/// Creates and verifies ANN search indexes on a collection.
pub struct VectorIndexManager {
    store: Arc<dyn CollectionStore>,
    options: IndexBuildOptions,
}

impl VectorIndexManager {
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self {
            store,
            options: IndexBuildOptions::default(),
        }
    }

    pub fn with_options(store: Arc<dyn CollectionStore>, options: IndexBuildOptions) -> Self {
        Self { store, options }
    }

    /// Create the index unless it already exists, then block until the
    /// store reports it ready.
    pub async fn ensure_index(
        &self,
        collection: &str,
        spec: &IndexSpec,
        cancel: &CancellationToken,
    ) -> Result<EnsureOutcome, IndexBuildError> {
        let existing = self.store.list_search_indexes(collection).await?;
        if existing.iter().any(|name| name == &spec.index_name) {
            info!(collection, index = %spec.index_name, "index already exists");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        info!(
            collection,
            index = %spec.index_name,
            dimensions = spec.dimensions,
            pre_filters = spec.pre_filter_fields.len(),
            "creating search index"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IndexBuildError::Cancelled),
            result = self.store.create_search_index(collection, spec) => result?,
        }

        self.wait_until_ready(collection, &spec.index_name, cancel)
            .await?;
        Ok(EnsureOutcome::Created)
    }

    async fn wait_until_ready(
        &self,
        collection: &str,
        index_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), IndexBuildError> {
        let start = Instant::now();
        let mut interval = self.options.initial_poll_interval;
        loop {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IndexBuildError::Cancelled),
                status = self.store.search_index_status(collection, index_name) => status?,
            };
            match status {
                IndexStatus::Ready => {
                    info!(
                        collection,
                        index = index_name,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "search index ready"
                    );
                    return Ok(());
                }
                IndexStatus::Failed(reason) => {
                    return Err(IndexBuildError::Failed {
                        index: index_name.to_string(),
                        reason,
                    })
                }
                IndexStatus::Building => {}
            }

            if start.elapsed() >= self.options.max_wait {
                return Err(IndexBuildError::Timeout {
                    index: index_name.to_string(),
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
            debug!(index = index_name, ?interval, "index still building");
            tokio::select! {
                _ = cancel.cancelled() => return Err(IndexBuildError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
            interval = (interval * 2).min(self.options.max_poll_interval);
        }
    }
}
