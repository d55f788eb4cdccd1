// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;
use tempfile::TempDir;
use text_vector_db::embedding::Embedder;
use text_vector_db::orchestrator::{FileSource, StringSource};
use text_vector_db::storage::{FileStorage, MockStorage, Storage};
use text_vector_db::{EngineConfig, EngineError, Orchestrator, Readiness, SessionState, VectorStore};

use crate::common::{CountingEmbedder, ARTICLES};

pub fn test_config() -> EngineConfig {
    EngineConfig {
        collection: "constitution".to_string(),
        chunk_size: 120,
        chunk_overlap: 20,
        top_k: 3,
        ..EngineConfig::default()
    }
}

pub fn document() -> StringSource {
    let text: Vec<String> = ARTICLES
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{} | {}", i + 1, line))
        .collect();
    StringSource::new("constitution.txt", text.join("\n"))
}

#[cfg(test)]
mod session_tests {
    use super::*;

    #[tokio::test]
    async fn test_second_session_reuses_collection() {
        let storage = MockStorage::new();
        let embedder = CountingEmbedder::new(64);

        let mut first = Orchestrator::open(
            Arc::new(VectorStore::new(storage.clone())),
            Arc::new(embedder.clone()),
            test_config(),
        )
        .await
        .unwrap();
        assert_eq!(first.state(), SessionState::NeedsBuild);

        let built = match first.ensure_ready(&document()).await.unwrap() {
            Readiness::Built(info) => info,
            other => panic!("expected a build, got {:?}", other),
        };
        assert_eq!(first.state(), SessionState::Ready);
        assert!(built.chunk_count > 1);
        let calls_after_build = embedder.calls();
        assert_eq!(calls_after_build, built.chunk_count);

        let mut second = Orchestrator::open(
            Arc::new(VectorStore::new(storage.clone())),
            Arc::new(embedder.clone()),
            test_config(),
        )
        .await
        .unwrap();
        assert_eq!(second.state(), SessionState::Ready);

        let reused = second.ensure_ready(&document()).await.unwrap();
        assert_eq!(reused, Readiness::Reused(built));
        assert_eq!(embedder.calls(), calls_after_build);

        // Only the query itself is embedded.
        second.ask("Senators").await.unwrap();
        assert_eq!(embedder.calls(), calls_after_build + 1);
    }

    #[tokio::test]
    async fn test_reuse_across_file_storage_reopen() {
        let dir = TempDir::new().unwrap();
        let embedder = CountingEmbedder::new(64);

        for expect_build in [true, false] {
            let store = Arc::new(VectorStore::new(FileStorage::open(dir.path()).await.unwrap()));
            let mut session = Orchestrator::open(store, Arc::new(embedder.clone()), test_config())
                .await
                .unwrap();
            let readiness = session.ensure_ready(&document()).await.unwrap();
            assert_eq!(matches!(readiness, Readiness::Built(_)), expect_build);
        }
    }

    #[tokio::test]
    async fn test_chunks_carry_source_metadata() {
        let embedder: Arc<dyn Embedder> = Arc::new(CountingEmbedder::new(64));
        let store = Arc::new(VectorStore::new(MockStorage::new()));
        let mut session = Orchestrator::open(store.clone(), embedder.clone(), test_config())
            .await
            .unwrap();
        session.ensure_ready(&document()).await.unwrap();

        let hits = store
            .query("constitution", ARTICLES[0], embedder.as_ref(), 1)
            .await
            .unwrap();
        let source = hits[0].chunk.metadata.get("source").unwrap();
        assert_eq!(source.to_string(), "constitution.txt");
        // Line numbers before the pipe are stripped.
        assert!(!hits[0].chunk.text.contains(" | "));
    }

    #[tokio::test]
    async fn test_rebuilds_when_collection_disappears() {
        let storage = MockStorage::new();
        let store = Arc::new(VectorStore::new(storage));
        let embedder: Arc<dyn Embedder> = Arc::new(CountingEmbedder::new(64));

        let mut first = Orchestrator::open(store.clone(), embedder.clone(), test_config())
            .await
            .unwrap();
        first.ensure_ready(&document()).await.unwrap();

        let mut second = Orchestrator::open(store.clone(), embedder, test_config())
            .await
            .unwrap();
        assert_eq!(second.state(), SessionState::Ready);
        assert!(store.delete("constitution").await.unwrap());

        let readiness = second.ensure_ready(&document()).await.unwrap();
        assert!(matches!(readiness, Readiness::Built(_)));
        assert!(store.exists("constitution").await.unwrap());
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    async fn fresh() -> Orchestrator<MockStorage> {
        Orchestrator::open(
            Arc::new(VectorStore::new(MockStorage::new())),
            Arc::new(CountingEmbedder::new(32)),
            test_config(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let config = EngineConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..test_config()
        };
        let err = Orchestrator::open(
            Arc::new(VectorStore::new(MockStorage::new())),
            Arc::new(CountingEmbedder::new(32)),
            config,
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_empty_source() {
        let mut session = fresh().await;
        let err = session
            .ensure_ready(&StringSource::new("blank.txt", "1 |   \n2 | "))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptySource(name) if name == "blank.txt"));
        assert_eq!(session.state(), SessionState::NeedsBuild);
    }

    #[tokio::test]
    async fn test_missing_source_file() {
        let dir = TempDir::new().unwrap();
        let mut session = fresh().await;
        let err = session
            .ensure_ready(&FileSource::new(dir.path().join("absent.txt")))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Source { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_ask_before_build() {
        let session = fresh().await;
        let err = session.ask("anything").await.unwrap_err();
        assert!(matches!(err, EngineError::NotReady(name) if name == "constitution"));
    }

    #[tokio::test]
    async fn test_torn_pointer_triggers_rebuild() {
        let storage = MockStorage::new();
        let embedder: Arc<dyn Embedder> = Arc::new(CountingEmbedder::new(32));
        let mut first = Orchestrator::open(
            Arc::new(VectorStore::new(storage.clone())),
            embedder.clone(),
            test_config(),
        )
        .await
        .unwrap();
        first.ensure_ready(&document()).await.unwrap();
        storage
            .put("collections/constitution/CURRENT", b"torn".to_vec())
            .await
            .unwrap();

        let mut session = Orchestrator::open(
            Arc::new(VectorStore::new(storage.clone())),
            embedder,
            test_config(),
        )
        .await
        .unwrap();
        assert_eq!(session.state(), SessionState::NeedsBuild);

        let readiness = session.ensure_ready(&document()).await.unwrap();
        assert!(matches!(readiness, Readiness::Built(_)));
        assert!(session.ask("Senators").await.is_ok());
    }

    #[tokio::test]
    async fn test_no_partial_collection_after_failed_build() {
        let storage = MockStorage::new();
        let store = Arc::new(VectorStore::new(storage.clone()));
        let mut session = Orchestrator::open(
            store.clone(),
            Arc::new(crate::common::FailAfterEmbedder::new(32, 2)),
            test_config(),
        )
        .await
        .unwrap();

        assert!(session.ensure_ready(&document()).await.is_err());
        assert_eq!(session.state(), SessionState::NeedsBuild);
        assert!(!store.exists("constitution").await.unwrap());
        assert!(storage.keys().await.is_empty());
    }
}
