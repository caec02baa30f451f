// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-memory collection store backed by HNSW ANN indexes
//!
//! Executes the full staged plan in process: the vector-search stage runs
//! against an `hnsw_rs` index built per `IndexSpec`, the query-time
//! pre-filter narrows the candidate pool before the limit cut, and the
//! post stages run in order over the materialized hits. Mutations rebuild
//! the collection's search indexes, matching the bulk-replace document
//! lifecycle.

use async_trait::async_trait;
use hnsw_rs::hnsw::{Hnsw, Neighbour};
use hnsw_rs::prelude::*;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::collection::{
    CollectionStore, IndexSpec, IndexStatus, PlanStats, SearchPlan, StageStats, StoreError,
};
use crate::pipeline::stages::{apply_stage, lookup_path, ScoredDocument};

struct AnnIndex {
    hnsw: Arc<Hnsw<'static, f32, DistCosine>>,
    /// hnsw internal id -> document position at build time
    id_map: Vec<usize>,
}

struct SearchIndex {
    spec: IndexSpec,
    status: IndexStatus,
    ann: Option<AnnIndex>,
}

#[derive(Default)]
struct Collection {
    documents: Vec<Value>,
    indexes: HashMap<String, SearchIndex>,
}

/// In-process `CollectionStore`. Constructed once and shared via `Arc`;
/// read-only after construction apart from the interior `RwLock`.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rebuild_indexes(collection: &mut Collection, name: &str) {
        for index in collection.indexes.values_mut() {
            match build_ann(&collection.documents, &index.spec) {
                Ok(ann) => {
                    index.ann = ann;
                    index.status = IndexStatus::Ready;
                }
                Err(e) => {
                    warn!(
                        collection = name,
                        index = %index.spec.index_name,
                        "index rebuild failed: {e}"
                    );
                    index.ann = None;
                    index.status = IndexStatus::Failed(e.to_string());
                }
            }
        }
    }

    fn execute_plan(
        collection: &Collection,
        collection_name: &str,
        plan: &SearchPlan,
    ) -> Result<(Vec<ScoredDocument>, PlanStats), StoreError> {
        let total_start = Instant::now();
        let stage = &plan.vector_stage;

        let index = collection.indexes.get(&stage.index_name).ok_or_else(|| {
            StoreError::IndexNotFound {
                collection: collection_name.to_string(),
                index: stage.index_name.clone(),
            }
        })?;
        match &index.status {
            IndexStatus::Ready => {}
            IndexStatus::Building => {
                return Err(StoreError::IndexNotReady {
                    index: stage.index_name.clone(),
                })
            }
            IndexStatus::Failed(reason) => return Err(StoreError::Backend(reason.clone())),
        }
        if stage.path != index.spec.embedding_field {
            return Err(StoreError::PathNotIndexed {
                index: stage.index_name.clone(),
                path: stage.path.clone(),
            });
        }
        if stage.query_vector.len() != index.spec.dimensions {
            return Err(StoreError::DimensionMismatch {
                index: stage.index_name.clone(),
                expected: index.spec.dimensions,
                actual: stage.query_vector.len(),
            });
        }
        if stage.query_vector.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::Backend(
                "query vector contains non-finite values".to_string(),
            ));
        }
        if !stage.filter.is_unrestricted() {
            for field in stage.filter.fields() {
                if !index.spec.pre_filter_fields.contains_key(field) {
                    return Err(StoreError::UnindexedFilterField {
                        index: stage.index_name.clone(),
                        field: field.to_string(),
                    });
                }
            }
        }

        // ANN stage: pull num_candidates neighbours, pre-filter the
        // candidate pool, then apply the limit cut.
        let ann_start = Instant::now();
        let mut stats = Vec::new();
        let mut hits: Vec<ScoredDocument> = Vec::new();
        let mut candidates_examined = 0;
        if let Some(ann) = &index.ann {
            let query = normalize_vector(&stage.query_vector);
            let ef_search = (stage.num_candidates * 2).max(50);
            let neighbours: Vec<Neighbour> =
                ann.hnsw.search(&query, stage.num_candidates, ef_search);
            candidates_examined = neighbours.len();

            for neighbour in neighbours {
                let Some(&doc_idx) = ann.id_map.get(neighbour.d_id) else {
                    continue;
                };
                let document = &collection.documents[doc_idx];
                if !stage.filter.is_unrestricted() && !stage.filter.matches(document) {
                    continue;
                }
                hits.push(ScoredDocument {
                    document: document.clone(),
                    score: 1.0 - neighbour.distance,
                });
            }
            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            hits.truncate(stage.limit);
        }
        stats.push(StageStats {
            stage: "vector_search".to_string(),
            candidates_examined,
            returned: hits.len(),
            elapsed_ms: ann_start.elapsed().as_millis() as u64,
        });

        for post in &plan.post_stages {
            let stage_start = Instant::now();
            let input = hits.len();
            hits = apply_stage(hits, post);
            stats.push(StageStats {
                stage: post.name().to_string(),
                candidates_examined: input,
                returned: hits.len(),
                elapsed_ms: stage_start.elapsed().as_millis() as u64,
            });
        }

        let plan_stats = PlanStats {
            stages: stats,
            total_elapsed_ms: total_start.elapsed().as_millis() as u64,
        };
        Ok((hits, plan_stats))
    }
}

#[async_trait]
impl CollectionStore for InMemoryStore {
    async fn replace_all(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<usize, StoreError> {
        let mut collections = self.collections.write().await;
        let coll = collections.entry(collection.to_string()).or_default();
        let inserted = documents.len();
        coll.documents = documents;
        Self::rebuild_indexes(coll, collection);
        debug!(collection, inserted, "collection replaced");
        Ok(inserted)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<usize, StoreError> {
        let mut collections = self.collections.write().await;
        let coll = collections.entry(collection.to_string()).or_default();
        let inserted = documents.len();
        coll.documents.extend(documents);
        Self::rebuild_indexes(coll, collection);
        Ok(inserted)
    }

    async fn delete_all(&self, collection: &str) -> Result<usize, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let removed = coll.documents.len();
        coll.documents.clear();
        Self::rebuild_indexes(coll, collection);
        Ok(removed)
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| c.documents.len())
            .unwrap_or(0))
    }

    async fn list_search_indexes(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| c.indexes.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_search_index(
        &self,
        collection: &str,
        spec: &IndexSpec,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.indexes.contains_key(&spec.index_name) {
            return Err(StoreError::IndexAlreadyExists {
                index: spec.index_name.clone(),
            });
        }

        for field in spec.pre_filter_fields.keys() {
            let present = coll
                .documents
                .iter()
                .any(|doc| lookup_path(doc, field).is_some());
            if !coll.documents.is_empty() && !present {
                // filtered queries on this field will return no matches
                warn!(
                    collection,
                    index = %spec.index_name,
                    field = %field,
                    "declared pre-filter field is absent from every indexed document"
                );
            }
        }

        let ann = build_ann(&coll.documents, spec)?;
        coll.indexes.insert(
            spec.index_name.clone(),
            SearchIndex {
                spec: spec.clone(),
                status: IndexStatus::Ready,
                ann,
            },
        );
        debug!(collection, index = %spec.index_name, "search index created");
        Ok(())
    }

    async fn search_index_status(
        &self,
        collection: &str,
        index_name: &str,
    ) -> Result<IndexStatus, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        coll.indexes
            .get(index_name)
            .map(|idx| idx.status.clone())
            .ok_or_else(|| StoreError::IndexNotFound {
                collection: collection.to_string(),
                index: index_name.to_string(),
            })
    }

    async fn aggregate(
        &self,
        collection: &str,
        plan: &SearchPlan,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        let (hits, _) = Self::execute_plan(coll, collection, plan)?;
        Ok(hits)
    }

    async fn explain(&self, collection: &str, plan: &SearchPlan) -> Result<PlanStats, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        let (_, stats) = Self::execute_plan(coll, collection, plan)?;
        Ok(stats)
    }
}

/// Build the ANN structure over every document carrying the embedding
/// field. Documents without the field are skipped (they simply do not
/// participate in vector search); a wrong-length vector is a
/// configuration error surfaced at build time.
fn build_ann(documents: &[Value], spec: &IndexSpec) -> Result<Option<AnnIndex>, StoreError> {
    let mut embeddings: Vec<(usize, Vec<f32>)> = Vec::new();
    for (doc_idx, doc) in documents.iter().enumerate() {
        let Some(value) = lookup_path(doc, &spec.embedding_field) else {
            continue;
        };
        let Some(raw) = value.as_array() else {
            continue;
        };
        let vector: Vec<f32> = raw
            .iter()
            .map(|v| v.as_f64().unwrap_or(f64::NAN) as f32)
            .collect();
        if vector.len() != spec.dimensions {
            return Err(StoreError::DimensionMismatch {
                index: spec.index_name.clone(),
                expected: spec.dimensions,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::InvalidDocument(format!(
                "document {doc_idx} embedding contains non-finite values"
            )));
        }
        embeddings.push((doc_idx, vector));
    }

    if embeddings.is_empty() {
        return Ok(None);
    }

    // HNSW parameters follow the build-speed-oriented defaults used for
    // embedding-sized vectors; layer count scales with dataset size.
    let max_nb_connection = 12;
    let ef_construction = 48;
    let nb_layer = if embeddings.len() > 1 {
        ((embeddings.len() as f32).log2().ceil() as usize).clamp(4, 16)
    } else {
        4
    };

    let mut hnsw: Hnsw<f32, DistCosine> = Hnsw::new(
        max_nb_connection,
        nb_layer,
        ef_construction,
        embeddings.len(),
        DistCosine,
    );

    let mut id_map = Vec::with_capacity(embeddings.len());
    for (hnsw_id, (doc_idx, vector)) in embeddings.into_iter().enumerate() {
        let normalized = normalize_vector(&vector);
        hnsw.insert((&normalized, hnsw_id));
        id_map.push(doc_idx);
    }
    hnsw.set_searching_mode(true);

    Ok(Some(AnnIndex {
        hnsw: Arc::new(hnsw),
        id_map,
    }))
}

/// Unit-normalize for cosine similarity; zero vectors pass through.
fn normalize_vector(vector: &[f32]) -> Vec<f32> {
    let magnitude: f32 = vector.iter().map(|&x| x * x).sum::<f32>().sqrt();
    if magnitude == 0.0 || !magnitude.is_finite() {
        return vector.to_vec();
    }
    vector.iter().map(|&x| x / magnitude).collect()
}
