// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod storage;
pub mod types;
pub mod vector_ops;

pub use storage::{MockStorage, Storage, StorageError};
pub use types::{Chunk, ChunkId, ChunkMetadata, DistanceMetric, Embedding, MetadataValue, SearchHit};
