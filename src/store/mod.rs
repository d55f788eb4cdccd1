// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod collection;
pub mod persistence;
pub mod vector_store;

use thiserror::Error;

use crate::core::storage::StorageError;
use crate::embedding::{EmbedError, EmbedderIdentity};

pub use collection::{
    ChunkRecord, CollectionInfo, CollectionManifest, CurrentPointer, LoadedCollection,
    COLLECTION_FORMAT_VERSION,
};
pub use persistence::CollectionPersister;
pub use vector_store::{StoreOptions, VectorStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Embedding function mismatch for collection '{collection}': built with {expected}, got {actual}")]
    EmbeddingFunctionMismatch {
        collection: String,
        expected: EmbedderIdentity,
        actual: EmbedderIdentity,
    },

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Embedder failed while {context}: {source}")]
    Embedding { context: String, source: EmbedError },

    #[error("Storage failure: {0}")]
    StorageIOFailure(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Data integrity error: {0}")]
    Integrity(String),

    #[error("Incompatible version: found {found}, expected {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },
}

impl StoreError {
    /// Whether repeating the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Embedding { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
