// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::types::{Chunk, DistanceMetric, Embedding};
use crate::embedding::EmbedderIdentity;
use crate::store::StoreError;

/// Current on-disk collection format version
pub const COLLECTION_FORMAT_VERSION: u32 = 1;

pub const MAX_COLLECTION_NAME_LEN: usize = 64;

const COLLECTIONS_ROOT: &str = "collections";

/// Collection names become storage key segments, so they are restricted to
/// ASCII alphanumerics, `-` and `_`.
pub fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(StoreError::InvalidConfiguration(format!(
            "collection name '{}' must be 1-{} characters of [A-Za-z0-9_-]",
            name, MAX_COLLECTION_NAME_LEN
        )));
    }
    Ok(())
}

/// A chunk and its vector as persisted in a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub vector: Embedding,
}

/// Points at the generation currently visible for a collection. Replacing
/// this single value is what makes a rebuild visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPointer {
    pub generation: u64,
    pub build_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionManifest {
    pub version: u32,
    pub name: String,
    pub embedder: EmbedderIdentity,
    pub metric: DistanceMetric,
    pub dimension: usize,
    pub chunk_count: usize,
    pub segment_count: usize,
    pub segment_size: usize,
    pub build_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Summary of a persisted collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub embedder: EmbedderIdentity,
    pub metric: DistanceMetric,
    pub dimension: usize,
    pub chunk_count: usize,
    pub generation: u64,
    pub build_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl CollectionInfo {
    pub fn from_manifest(manifest: &CollectionManifest, generation: u64) -> Self {
        Self {
            name: manifest.name.clone(),
            embedder: manifest.embedder.clone(),
            metric: manifest.metric,
            dimension: manifest.dimension,
            chunk_count: manifest.chunk_count,
            generation,
            build_id: manifest.build_id,
            created_at: manifest.created_at,
        }
    }
}

/// A fully loaded collection, records ordered by chunk id.
#[derive(Debug, Clone)]
pub struct LoadedCollection {
    pub manifest: CollectionManifest,
    pub pointer: CurrentPointer,
    pub records: Vec<ChunkRecord>,
}

impl LoadedCollection {
    pub fn info(&self) -> CollectionInfo {
        CollectionInfo::from_manifest(&self.manifest, self.pointer.generation)
    }
}

/// Storage key layout of one collection.
#[derive(Debug, Clone)]
pub struct CollectionPaths {
    name: String,
}

impl CollectionPaths {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn collections_prefix() -> String {
        format!("{}/", COLLECTIONS_ROOT)
    }

    pub fn root(&self) -> String {
        format!("{}/{}/", COLLECTIONS_ROOT, self.name)
    }

    pub fn current(&self) -> String {
        format!("{}/{}/CURRENT", COLLECTIONS_ROOT, self.name)
    }

    pub fn generation_prefix(&self, generation: u64) -> String {
        format!("{}/{}/gen_{:010}/", COLLECTIONS_ROOT, self.name, generation)
    }

    pub fn manifest(&self, generation: u64) -> String {
        format!("{}manifest.cbor", self.generation_prefix(generation))
    }

    pub fn segment(&self, generation: u64, index: usize) -> String {
        format!("{}segments/segment_{:04}.cbor", self.generation_prefix(generation), index)
    }

    /// Generation encoded in a key under this collection, if any.
    pub fn generation_of(&self, key: &str) -> Option<u64> {
        let rest = key.strip_prefix(&self.root())?;
        let dir = rest.split('/').next()?;
        dir.strip_prefix("gen_")?.parse().ok()
    }
}
