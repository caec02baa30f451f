// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Retrieval-augmented query operations
//!
//! The in-process facade consumed by the front end. Every operation maps
//! 1:1 to one `RetrievalPipeline` invocation with a specific stage
//! composition and returns `{ok, response}`. Index builds are separate
//! admin operations so their multi-second readiness wait never sits on
//! the query path.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::compress::{CompressorConfig, ContextCompressor};
use crate::config::RagConfig;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::generation::AnswerGenerator;
use crate::pipeline::index::{EnsureOutcome, IndexBuildError, VectorIndexManager};
use crate::pipeline::search::{QuerySpec, RetrievalPipeline, SearchError};
use crate::pipeline::stages::{review_boost_stages, CmpOp, PostStage, Predicate};
use crate::store::collection::{CollectionStore, FilterFieldType, IndexSpec};

const COMPRESSION_INSTRUCTION: &str =
    "Write a high-quality answer for the given question using only the provided search results.";

/// Operation outcome handed back to the front end.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryResponse {
    pub ok: bool,
    pub response: String,
}

impl QueryResponse {
    fn answer(response: String) -> Self {
        Self { ok: true, response }
    }

    fn no_response() -> Self {
        Self {
            ok: true,
            response: "No response".to_string(),
        }
    }

    fn failed(error: &SearchError) -> Self {
        Self {
            ok: false,
            response: error.to_string(),
        }
    }
}

/// Wires the pipeline, index manager, compressor and generator around one
/// store handle. Construct once at process start and share.
pub struct RagService {
    store: Arc<dyn CollectionStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    pipeline: RetrievalPipeline,
    index_manager: VectorIndexManager,
    compressor: ContextCompressor,
    config: RagConfig,
}

impl RagService {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
        config: RagConfig,
    ) -> Self {
        let pipeline = RetrievalPipeline::new(embedder.clone(), store.clone());
        let index_manager = VectorIndexManager::new(store.clone());
        let compressor = ContextCompressor::new(CompressorConfig {
            target_tokens: config.compression.target_tokens,
            ratio: config.compression.ratio,
            reorder: config.compression.reorder,
        });
        Self {
            store,
            embedder,
            generator,
            pipeline,
            index_manager,
            compressor,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn CollectionStore> {
        &self.store
    }

    /// Admin operation: build the plain vector index.
    pub async fn build_index(
        &self,
        cancel: &CancellationToken,
    ) -> Result<EnsureOutcome, IndexBuildError> {
        let spec = IndexSpec::new(
            &self.config.collection.index_name,
            &self.config.collection.embedding_field,
            self.config.embedding.dimensions,
        );
        self.ensure(spec, cancel).await
    }

    /// Admin operation: build the index that declares the pre-filter
    /// attribute fields.
    pub async fn build_pre_filter_index(
        &self,
        cancel: &CancellationToken,
    ) -> Result<EnsureOutcome, IndexBuildError> {
        let spec = IndexSpec::new(
            &self.config.collection.pre_filter_index_name,
            &self.config.collection.embedding_field,
            self.config.embedding.dimensions,
        )
        .with_pre_filter("accommodates", FilterFieldType::Number)
        .with_pre_filter("bedrooms", FilterFieldType::Number);
        self.ensure(spec, cancel).await
    }

    async fn ensure(
        &self,
        spec: IndexSpec,
        cancel: &CancellationToken,
    ) -> Result<EnsureOutcome, IndexBuildError> {
        // provider/index dimensionality mismatch is a configuration
        // error and belongs to build time, not query time
        if self.embedder.dimensions() != spec.dimensions {
            return Err(IndexBuildError::DimensionMismatch {
                provider: self.embedder.dimensions(),
                declared: spec.dimensions,
            });
        }
        self.index_manager
            .ensure_index(&self.config.collection.collection, &spec, cancel)
            .await
    }

    /// Plain retrieval-augmented query.
    pub async fn run_query(&self, query: &str, cancel: &CancellationToken) -> QueryResponse {
        let spec = self
            .base_query(query)
            .with_stages(vec![listing_context_projection()]);
        self.execute(&self.config.collection.index_name, spec, false, cancel)
            .await
    }

    /// Query restricted during ANN search by the declared attribute
    /// filters. Requires `build_pre_filter_index` to have run.
    pub async fn run_query_with_pre_filter(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> QueryResponse {
        let spec = self
            .base_query(query)
            .with_filter(family_stay_pre_filter())
            .with_stages(vec![compact_listing_projection()]);
        self.execute(
            &self.config.collection.pre_filter_index_name,
            spec,
            false,
            cancel,
        )
        .await
    }

    /// Query with hits narrowed after retrieval by a match stage.
    pub async fn run_query_with_post_filter(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> QueryResponse {
        let spec = self
            .base_query(query)
            .with_stages(vec![us_family_post_filter(), compact_listing_projection()]);
        self.execute(&self.config.collection.index_name, spec, false, cancel)
            .await
    }

    /// Query reshaping each hit to a fixed field set.
    pub async fn run_query_with_projections(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> QueryResponse {
        let spec = self
            .base_query(query)
            .with_stages(vec![compact_listing_projection()]);
        self.execute(&self.config.collection.index_name, spec, false, cancel)
            .await
    }

    /// Query reranked by the review-quality/volume boosting chain.
    pub async fn run_query_with_doc_boost(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> QueryResponse {
        let mut stages = review_boost_stages();
        stages.push(boosted_listing_projection());
        let spec = self.base_query(query).with_stages(stages);
        self.execute(&self.config.collection.index_name, spec, false, cancel)
            .await
    }

    /// Post-filtered query whose retrieved context is compressed to the
    /// configured token budget before generation.
    pub async fn run_query_with_compressed_context(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> QueryResponse {
        let spec = self
            .base_query(query)
            .with_stages(vec![us_family_post_filter(), compact_listing_projection()]);
        self.execute(&self.config.collection.index_name, spec, true, cancel)
            .await
    }

    fn base_query(&self, query: &str) -> QuerySpec {
        QuerySpec::new(query)
            .with_k(self.config.search.limit)
            .with_num_candidates(self.config.search.num_candidates)
    }

    async fn execute(
        &self,
        index_name: &str,
        spec: QuerySpec,
        compress_context: bool,
        cancel: &CancellationToken,
    ) -> QueryResponse {
        let result = match self
            .pipeline
            .search(
                &self.config.collection.collection,
                index_name,
                &self.config.collection.embedding_field,
                &spec,
                cancel,
            )
            .await
        {
            Ok(result) => result,
            Err(SearchError::Embedding(EmbeddingError::InvalidInput(reason))) => {
                // bad query text is local, never fatal
                return QueryResponse {
                    ok: false,
                    response: format!("Invalid query: {reason}"),
                };
            }
            Err(e) => {
                warn!(index = index_name, "query failed: {e}");
                return QueryResponse::failed(&e);
            }
        };

        if result.is_empty() {
            info!(index = index_name, "no hits for query");
            return QueryResponse::no_response();
        }

        let context = if compress_context {
            let items: Vec<String> = result
                .documents
                .iter()
                .map(|d| d.document.to_string())
                .collect();
            self.compressor.compress(
                &items,
                COMPRESSION_INSTRUCTION,
                &spec.query_text,
                self.config.compression.target_tokens,
            )
        } else {
            let docs: Vec<serde_json::Value> = result
                .documents
                .iter()
                .map(|d| d.document.clone())
                .collect();
            serde_json::Value::Array(docs).to_string()
        };

        match self.generator.generate(&spec.query_text, &context).await {
            Ok(answer) => QueryResponse::answer(answer),
            Err(e) => {
                let e = SearchError::Generation(e);
                warn!(index = index_name, "generation failed: {e}");
                QueryResponse::failed(&e)
            }
        }
    }
}

/// Match stage keeping United States listings sized for small groups.
pub fn us_family_post_filter() -> PostStage {
    PostStage::Filter(Predicate::all(vec![
        Predicate::regex("address.country", "United States").expect("static pattern"),
        Predicate::cmp("accommodates", CmpOp::Gt, 1),
        Predicate::cmp("accommodates", CmpOp::Lt, 5),
    ]))
}

/// Query-time pre-filter over the declared attribute fields.
pub fn family_stay_pre_filter() -> Predicate {
    Predicate::all(vec![
        Predicate::cmp("accommodates", CmpOp::Gte, 2),
        Predicate::cmp("bedrooms", CmpOp::Lte, 7),
    ])
}

/// Context shape for plain queries.
pub fn listing_context_projection() -> PostStage {
    PostStage::Project {
        fields: [
            "name",
            "accommodates",
            "address",
            "summary",
            "description",
            "neighborhood_overview",
            "notes",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        computed: vec![],
    }
}

/// Narrower context shape used by the filtered variants.
pub fn compact_listing_projection() -> PostStage {
    PostStage::Project {
        fields: ["name", "accommodates", "bedrooms", "address", "space"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        computed: vec![],
    }
}

/// Context shape for boosted queries; runs after the boosting chain so
/// the computed scores are present to keep.
pub fn boosted_listing_projection() -> PostStage {
    PostStage::Project {
        fields: [
            "name",
            "accommodates",
            "address",
            "number_of_reviews",
            "average_review_score",
            "combined_score",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        computed: vec![],
    }
}
