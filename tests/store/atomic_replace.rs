// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use text_vector_db::core::types::DistanceMetric;
use text_vector_db::storage::MockStorage;
use text_vector_db::store::{StoreError, StoreOptions, VectorStore};

use crate::common::{chunks_from, CountingEmbedder, FailAfterEmbedder, ARTICLES};

const DIM: usize = 64;

async fn store_with_five(storage: MockStorage) -> VectorStore<MockStorage> {
    let store = VectorStore::with_options(
        storage,
        StoreOptions {
            segment_size: 2,
            ..StoreOptions::default()
        },
    );
    store
        .build(
            "articles",
            &chunks_from(&ARTICLES[..5]),
            &CountingEmbedder::new(DIM),
            DistanceMetric::Cosine,
        )
        .await
        .unwrap();
    store
}

#[cfg(test)]
mod replace_tests {
    use super::*;

    #[tokio::test]
    async fn test_rebuild_replaces_contents() {
        let store = store_with_five(MockStorage::new()).await;
        let embedder = CountingEmbedder::new(DIM);

        let info = store
            .build("articles", &chunks_from(&ARTICLES), &embedder, DistanceMetric::Cosine)
            .await
            .unwrap();
        assert_eq!(info.chunk_count, 10);
        assert_eq!(info.generation, 2);

        let hits = store
            .query("articles", ARTICLES[8], &embedder, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 10);
        assert_eq!(hits[0].chunk.text, ARTICLES[8]);
    }

    #[tokio::test]
    async fn test_failed_embedding_keeps_previous_collection() {
        let storage = MockStorage::new();
        let store = store_with_five(storage.clone()).await;
        let keys_before = storage.keys().await;

        let err = store
            .build(
                "articles",
                &chunks_from(&ARTICLES),
                &FailAfterEmbedder::new(DIM, 5),
                DistanceMetric::Cosine,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Embedding { .. }));
        assert!(err.is_retryable());

        assert_eq!(storage.keys().await, keys_before);
        let info = store.info("articles").await.unwrap().unwrap();
        assert_eq!(info.chunk_count, 5);
        assert_eq!(info.generation, 1);

        let hits = store
            .query("articles", "Congress", &CountingEmbedder::new(DIM), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_collection() {
        let storage = MockStorage::new();
        let store = store_with_five(storage.clone()).await;
        let keys_before = storage.keys().await;

        // Ten records in segments of two: the third segment write fails.
        storage.fail_puts_after(2).await;
        let err = store
            .build(
                "articles",
                &chunks_from(&ARTICLES),
                &CountingEmbedder::new(DIM),
                DistanceMetric::Cosine,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StorageIOFailure(_)));
        storage.clear_failures().await;

        // Staged generation cleaned up, pointer untouched.
        assert_eq!(storage.keys().await, keys_before);

        // A fresh store over the same storage sees the old collection.
        let reopened = VectorStore::new(storage.clone());
        let info = reopened.info("articles").await.unwrap().unwrap();
        assert_eq!(info.chunk_count, 5);
        let hits = reopened
            .query("articles", "Senate", &CountingEmbedder::new(DIM), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn test_failed_publish_keeps_previous_collection() {
        let storage = MockStorage::new();
        let store = store_with_five(storage.clone()).await;

        // Five segments and the manifest succeed; the pointer write fails.
        storage.fail_puts_after(6).await;
        let result = store
            .build(
                "articles",
                &chunks_from(&ARTICLES),
                &CountingEmbedder::new(DIM),
                DistanceMetric::Cosine,
            )
            .await;
        assert!(result.is_err());
        storage.clear_failures().await;

        let info = store.info("articles").await.unwrap().unwrap();
        assert_eq!(info.generation, 1);
        assert_eq!(info.chunk_count, 5);
        assert!(!storage
            .keys()
            .await
            .iter()
            .any(|k| k.contains("gen_0000000002")));
    }

    #[tokio::test]
    async fn test_stale_generations_removed() {
        let storage = MockStorage::new();
        let store = store_with_five(storage.clone()).await;
        store
            .build(
                "articles",
                &chunks_from(&ARTICLES[..3]),
                &CountingEmbedder::new(DIM),
                DistanceMetric::Cosine,
            )
            .await
            .unwrap();

        let keys = storage.keys().await;
        assert!(keys.contains(&"collections/articles/CURRENT".to_string()));
        assert!(keys
            .iter()
            .filter(|k| k.as_str() != "collections/articles/CURRENT")
            .all(|k| k.starts_with("collections/articles/gen_0000000002/")));
        // Three records in segments of two.
        assert!(keys.contains(&"collections/articles/gen_0000000002/segments/segment_0001.cbor".to_string()));
    }
}
