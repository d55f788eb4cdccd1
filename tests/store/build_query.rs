// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use approx::assert_relative_eq;
use text_vector_db::core::types::{ChunkId, DistanceMetric};
use text_vector_db::storage::MockStorage;
use text_vector_db::store::{StoreError, VectorStore};

use crate::common::{chunks_from, TableEmbedder};

fn compass() -> TableEmbedder {
    TableEmbedder::new("table-v1", 2)
        .with("north", vec![0.0, 1.0])
        .with("east", vec![1.0, 0.0])
        .with("northeast", vec![1.0, 1.0])
        .with("east again", vec![1.0, 0.0])
        .with("q", vec![1.0, 0.0])
}

async fn built(metric: DistanceMetric) -> VectorStore<MockStorage> {
    let store = VectorStore::new(MockStorage::new());
    store
        .build(
            "compass",
            &chunks_from(&["north", "east", "northeast", "east again"]),
            &compass(),
            metric,
        )
        .await
        .unwrap();
    store
}

fn ids(hits: &[text_vector_db::core::types::SearchHit]) -> Vec<ChunkId> {
    hits.iter().map(|h| h.chunk.id).collect()
}

#[cfg(test)]
mod query_tests {
    use super::*;

    #[tokio::test]
    async fn test_build_reports_info() {
        let store = VectorStore::new(MockStorage::new());
        let info = store
            .build(
                "compass",
                &chunks_from(&["north", "east"]),
                &compass(),
                DistanceMetric::Cosine,
            )
            .await
            .unwrap();

        assert_eq!(info.name, "compass");
        assert_eq!(info.chunk_count, 2);
        assert_eq!(info.dimension, 2);
        assert_eq!(info.generation, 1);
        assert_eq!(info.embedder.model, "table-v1");
        assert!(store.exists("compass").await.unwrap());
    }

    #[tokio::test]
    async fn test_results_ordered_with_id_tie_break() {
        let store = built(DistanceMetric::Cosine).await;
        let hits = store.query("compass", "q", &compass(), 3).await.unwrap();

        assert_eq!(ids(&hits), vec![ChunkId::new(1), ChunkId::new(3), ChunkId::new(2)]);
        assert_relative_eq!(hits[0].score, 1.0, epsilon = 1e-6);
        assert_relative_eq!(hits[1].score, 1.0, epsilon = 1e-6);
        assert_relative_eq!(hits[2].score, std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-5);
        assert_eq!(hits[0].chunk.text, "east");
    }

    #[tokio::test]
    async fn test_euclidean_metric() {
        let store = built(DistanceMetric::Euclidean).await;
        let hits = store.query("compass", "q", &compass(), 4).await.unwrap();

        assert_eq!(
            ids(&hits),
            vec![ChunkId::new(1), ChunkId::new(3), ChunkId::new(2), ChunkId::new(0)]
        );
        assert_relative_eq!(hits[2].distance, 1.0, epsilon = 1e-6);
        assert_relative_eq!(hits[3].distance, std::f32::consts::SQRT_2, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn test_k_larger_than_collection() {
        let store = built(DistanceMetric::Cosine).await;
        let hits = store.query("compass", "q", &compass(), 50).await.unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[tokio::test]
    async fn test_k_zero_returns_nothing() {
        let store = built(DistanceMetric::Cosine).await;
        assert!(store.query("compass", "q", &compass(), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_queries_agree() {
        let store = built(DistanceMetric::Cosine).await;
        let first = store.query("compass", "q", &compass(), 3).await.unwrap();
        let second = store.query("compass", "q", &compass(), 3).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let store = VectorStore::new(MockStorage::new());
        let err = store.query("nothing", "q", &compass(), 3).await.unwrap_err();
        assert!(matches!(err, StoreError::CollectionNotFound(name) if name == "nothing"));
        assert!(!store.exists("nothing").await.unwrap());
        assert!(store.info("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_collection_name() {
        let store = VectorStore::new(MockStorage::new());
        let err = store
            .build("../etc", &chunks_from(&["north"]), &compass(), DistanceMetric::Cosine)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_zero_chunks_rejected() {
        let store = VectorStore::new(MockStorage::new());
        let err = store
            .build("compass", &[], &compass(), DistanceMetric::Cosine)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfiguration(_)));
        assert!(!store.exists("compass").await.unwrap());
    }
}

#[cfg(test)]
mod mismatch_tests {
    use super::*;

    #[tokio::test]
    async fn test_different_model_rejected() {
        let store = built(DistanceMetric::Cosine).await;
        let other = TableEmbedder::new("table-v2", 2).with("q", vec![1.0, 0.0]);

        let err = store.query("compass", "q", &other, 3).await.unwrap_err();
        match err {
            StoreError::EmbeddingFunctionMismatch {
                collection,
                expected,
                actual,
            } => {
                assert_eq!(collection, "compass");
                assert_eq!(expected.model, "table-v1");
                assert_eq!(actual.model, "table-v2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_query_dimension_checked() {
        let store = built(DistanceMetric::Cosine).await;
        // Same identity, but the vector it returns is too long.
        let lying = TableEmbedder::new("table-v1", 2).with("q", vec![1.0, 0.0, 0.0]);

        let err = store.query("compass", "q", &lying, 3).await.unwrap_err();
        assert!(matches!(err, StoreError::EmbeddingFunctionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_build_dimension_checked() {
        let store = VectorStore::new(MockStorage::new());
        let lying = TableEmbedder::new("table-v1", 3).with("north", vec![0.0, 1.0]);

        let err = store
            .build("compass", &chunks_from(&["north"]), &lying, DistanceMetric::Cosine)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmbeddingFunctionMismatch { .. }));
        assert!(!store.exists("compass").await.unwrap());
    }
}

#[cfg(test)]
mod delete_tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let storage = MockStorage::new();
        let store = VectorStore::new(storage.clone());
        store
            .build("compass", &chunks_from(&["north", "east"]), &compass(), DistanceMetric::Cosine)
            .await
            .unwrap();

        assert!(store.delete("compass").await.unwrap());
        assert!(!store.exists("compass").await.unwrap());
        assert!(storage.keys().await.is_empty());

        let err = store.query("compass", "q", &compass(), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = VectorStore::new(MockStorage::new());
        assert!(!store.delete("compass").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_collections() {
        let store = VectorStore::new(MockStorage::new());
        for name in ["beta", "alpha"] {
            store
                .build(name, &chunks_from(&["north"]), &compass(), DistanceMetric::Cosine)
                .await
                .unwrap();
        }
        assert_eq!(store.list_collections().await.unwrap(), vec!["alpha", "beta"]);

        store.delete("alpha").await.unwrap();
        assert_eq!(store.list_collections().await.unwrap(), vec!["beta"]);
    }
}
