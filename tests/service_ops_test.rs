// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Operation-facade tests: each operation maps to one pipeline
//! invocation and returns `{ok, response}`.

mod common;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use common::{FailingGenerator, MockEmbedder, MockGenerator};
use stayfinder_node::config::RagConfig;
use stayfinder_node::documents::validate_listings;
use stayfinder_node::pipeline::EnsureOutcome;
use stayfinder_node::service::RagService;
use stayfinder_node::store::{CollectionStore, InMemoryStore};

const QUERY: &str = "a warm and friendly place not too far from restaurants";

fn test_config() -> RagConfig {
    let mut config = RagConfig::default();
    config.embedding.dimensions = 3;
    config.search.limit = 5;
    config.search.num_candidates = 50;
    config
}

fn query_vector() -> Vec<f32> {
    vec![0.8, 0.2, 0.0]
}

async fn seeded_service(generator: Arc<dyn stayfinder_node::AnswerGenerator>) -> RagService {
    common::init_tracing();
    let store: Arc<dyn CollectionStore> = Arc::new(InMemoryStore::new());
    let records = vec![
        common::listing_doc(1, "Sunny Loft", "United States", 1, vec![1.0, 0.0, 0.0]),
        common::listing_doc(2, "Warm Studio", "United States", 3, vec![0.9, 0.1, 0.0]),
        common::listing_doc(3, "Quiet Cabin", "Portugal", 6, vec![0.5, 0.5, 0.0]),
    ];
    let (valid, errors) = validate_listings(records, Some(3));
    assert!(errors.is_empty());
    store.replace_all("listings_reviews", valid).await.unwrap();

    let embedder = Arc::new(MockEmbedder::with_mapping(3, &[(QUERY, query_vector())]));
    let service = RagService::new(store, embedder, generator, test_config());

    let cancel = CancellationToken::new();
    assert_eq!(
        service.build_index(&cancel).await.unwrap(),
        EnsureOutcome::Created
    );
    assert_eq!(
        service.build_pre_filter_index(&cancel).await.unwrap(),
        EnsureOutcome::Created
    );
    service
}

#[tokio::test]
async fn test_build_index_is_idempotent() {
    let service = seeded_service(Arc::new(MockGenerator)).await;
    let outcome = service
        .build_index(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, EnsureOutcome::AlreadyExists);
}

#[tokio::test]
async fn test_run_query_answers_from_context() {
    let service = seeded_service(Arc::new(MockGenerator)).await;
    let response = service.run_query(QUERY, &CancellationToken::new()).await;
    assert!(response.ok);
    assert!(response.response.contains("answer to"));
    // plain queries hand the generator raw serialized hits
    assert!(response.response.contains("context["));
}

#[tokio::test]
async fn test_run_query_with_pre_filter_uses_declared_fields() {
    let service = seeded_service(Arc::new(MockGenerator)).await;
    let response = service
        .run_query_with_pre_filter(QUERY, &CancellationToken::new())
        .await;
    assert!(response.ok, "{}", response.response);
    assert_ne!(response.response, "No response");
}

#[tokio::test]
async fn test_run_query_with_post_filter() {
    let service = seeded_service(Arc::new(MockGenerator)).await;
    let response = service
        .run_query_with_post_filter(QUERY, &CancellationToken::new())
        .await;
    assert!(response.ok);
    assert_ne!(response.response, "No response");
}

#[tokio::test]
async fn test_run_query_with_projections() {
    let service = seeded_service(Arc::new(MockGenerator)).await;
    let response = service
        .run_query_with_projections(QUERY, &CancellationToken::new())
        .await;
    assert!(response.ok);
}

#[tokio::test]
async fn test_run_query_with_doc_boost() {
    let service = seeded_service(Arc::new(MockGenerator)).await;
    let response = service
        .run_query_with_doc_boost(QUERY, &CancellationToken::new())
        .await;
    assert!(response.ok);
    assert_ne!(response.response, "No response");
}

#[tokio::test]
async fn test_run_query_with_compressed_context_reshapes_prompt() {
    // same hits, different context: the plain variant passes raw
    // serialized documents, the compressed variant an instruction-led
    // compressed prompt
    let service = seeded_service(Arc::new(MockGenerator)).await;
    let plain = service
        .run_query_with_post_filter(QUERY, &CancellationToken::new())
        .await;
    let compressed = service
        .run_query_with_compressed_context(QUERY, &CancellationToken::new())
        .await;
    assert!(plain.ok, "{}", plain.response);
    assert!(compressed.ok, "{}", compressed.response);
    assert!(plain.response.contains("[{"));
    assert!(compressed.response.contains("Write a high-quality answer"));
}

#[tokio::test]
async fn test_empty_retrieval_returns_no_response_not_error() {
    let service = seeded_service(Arc::new(MockGenerator)).await;
    // wipes the collection; indexes rebuild over nothing
    service
        .store()
        .delete_all("listings_reviews")
        .await
        .unwrap();
    let response = service.run_query(QUERY, &CancellationToken::new()).await;
    assert!(response.ok);
    assert_eq!(response.response, "No response");
}

#[tokio::test]
async fn test_invalid_query_text_is_local_not_fatal() {
    let service = seeded_service(Arc::new(MockGenerator)).await;
    let response = service.run_query("   ", &CancellationToken::new()).await;
    assert!(!response.ok);
    assert!(response.response.starts_with("Invalid query"));
}

#[tokio::test]
async fn test_generation_failure_surfaces_as_failed_operation() {
    let service = seeded_service(Arc::new(FailingGenerator)).await;
    let response = service.run_query(QUERY, &CancellationToken::new()).await;
    assert!(!response.ok);
    assert!(response.response.contains("generation"));
}
