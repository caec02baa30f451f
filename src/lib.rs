// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod compress;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod generation;
pub mod pipeline;
pub mod service;
pub mod store;

// Re-export main types
pub use compress::{CompressorConfig, ContextCompressor, ReorderPolicy};
pub use config::{EmbeddingBackend, RagConfig};
pub use documents::{validate_listings, Listing, ValidationError};
pub use embedding::{
    provider_from_settings, EmbeddingError, EmbeddingProvider, JinaEmbeddings, OpenAiEmbeddings,
};
pub use generation::{AnswerGenerator, ChatCompletionsGenerator, ChatGeneratorConfig, GenerationError};
pub use pipeline::{
    review_boost_stages, EnsureOutcome, FieldExpr, IndexBuildError, PostStage, Predicate,
    QuerySpec, RetrievalPipeline, RetrievalResult, ScoredDocument, SearchError, SortDirection,
    VectorIndexManager,
};
pub use service::{QueryResponse, RagService};
pub use store::{
    CollectionStore, FilterFieldType, IndexSpec, IndexStatus, InMemoryStore, PlanStats,
    SearchPlan, SimilarityMetric, StoreError, VectorSearchStage,
};
