// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-end reranking: the boosting chain runs inside the staged plan
//! and reorders ANN hits by the blended quality/volume score.

mod common;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use common::MockEmbedder;
use stayfinder_node::pipeline::{review_boost_stages, QuerySpec, RetrievalPipeline};
use stayfinder_node::store::{CollectionStore, IndexSpec, InMemoryStore};

const COLLECTION: &str = "listings";
const INDEX: &str = "idx";
const EMB_FIELD: &str = "text_embeddings";

async fn pipeline_over(docs: Vec<serde_json::Value>, query_vector: Vec<f32>) -> RetrievalPipeline {
    let store = Arc::new(InMemoryStore::new());
    store.replace_all(COLLECTION, docs).await.unwrap();
    store
        .create_search_index(COLLECTION, &IndexSpec::new(INDEX, EMB_FIELD, 3))
        .await
        .unwrap();
    let embedder = Arc::new(MockEmbedder::with_mapping(3, &[("q", query_vector)]));
    RetrievalPipeline::new(embedder, store)
}

#[tokio::test]
async fn test_volume_outweighs_marginal_quality() {
    // 0.9*4.5 + 0.1*90 = 13.05 vs 0.9*4.8 + 0.1*3 = 4.62: the listing
    // with the lower raw average but far more reviews ranks first
    let pipeline = pipeline_over(
        vec![
            common::reviewed_listing_doc(1, "pristine", 4.8, 3, vec![1.0, 0.0, 0.0]),
            common::reviewed_listing_doc(2, "popular", 4.5, 90, vec![0.95, 0.05, 0.0]),
        ],
        vec![1.0, 0.0, 0.0],
    )
    .await;

    let result = pipeline
        .search(
            COLLECTION,
            INDEX,
            EMB_FIELD,
            &QuerySpec::new("q").with_stages(review_boost_stages()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result.documents[0].document["name"], "popular");
    let first = result.documents[0].document["combined_score"]
        .as_f64()
        .unwrap();
    let second = result.documents[1].document["combined_score"]
        .as_f64()
        .unwrap();
    assert!((first - 13.05).abs() < 1e-9);
    assert!((second - 4.62).abs() < 1e-9);
    assert!(first >= second);
}

#[tokio::test]
async fn test_combined_scores_are_non_increasing() {
    let docs = vec![
        common::reviewed_listing_doc(1, "a", 3.0, 5, vec![1.0, 0.0, 0.0]),
        common::reviewed_listing_doc(2, "b", 4.9, 200, vec![0.9, 0.1, 0.0]),
        common::reviewed_listing_doc(3, "c", 4.0, 40, vec![0.8, 0.2, 0.0]),
        common::reviewed_listing_doc(4, "d", 2.0, 1, vec![0.7, 0.3, 0.0]),
    ];
    let pipeline = pipeline_over(docs, vec![1.0, 0.0, 0.0]).await;

    let result = pipeline
        .search(
            COLLECTION,
            INDEX,
            EMB_FIELD,
            &QuerySpec::new("q").with_stages(review_boost_stages()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let scores: Vec<f64> = result
        .documents
        .iter()
        .map(|d| d.document["combined_score"].as_f64().unwrap())
        .collect();
    assert_eq!(scores.len(), 4);
    for pair in scores.windows(2) {
        assert!(pair[0] >= pair[1], "scores must be non-increasing: {scores:?}");
    }
}

#[tokio::test]
async fn test_listing_without_subscores_sorts_last_without_crashing() {
    let mut bare = common::listing_doc(3, "unreviewed", "United States", 2, vec![0.9, 0.1, 0.0]);
    bare["review_scores"] = serde_json::json!({});
    bare["number_of_reviews"] = serde_json::json!(0);

    let pipeline = pipeline_over(
        vec![
            bare,
            common::reviewed_listing_doc(1, "reviewed", 4.0, 10, vec![1.0, 0.0, 0.0]),
        ],
        vec![1.0, 0.0, 0.0],
    )
    .await;

    let result = pipeline
        .search(
            COLLECTION,
            INDEX,
            EMB_FIELD,
            &QuerySpec::new("q").with_stages(review_boost_stages()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.documents[0].document["name"], "reviewed");
    assert_eq!(
        result.documents[1].document["combined_score"],
        serde_json::Value::Null
    );
}
