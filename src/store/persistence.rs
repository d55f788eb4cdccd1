// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::cbor::{CborDecoder, CborEncoder};
use crate::core::storage::Storage;
use crate::store::collection::{
    ChunkRecord, CollectionManifest, CollectionPaths, CurrentPointer, LoadedCollection,
    COLLECTION_FORMAT_VERSION,
};
use crate::store::StoreError;

pub const DEFAULT_SEGMENT_SIZE: usize = 1000;

/// Reads and writes collection generations on a [`Storage`].
pub struct CollectionPersister<S: Storage> {
    storage: S,
    segment_size: usize,
}

impl<S: Storage> CollectionPersister<S> {
    pub fn with_segment_size(storage: S, segment_size: usize) -> Self {
        Self {
            storage,
            segment_size: segment_size.max(1),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub async fn read_pointer(&self, name: &str) -> Result<Option<CurrentPointer>, StoreError> {
        let key = CollectionPaths::new(name).current();
        match self.storage.get(&key).await? {
            Some(data) => CborDecoder::decode(&data)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Writes segments then the manifest of `generation`. Nothing becomes
    /// visible until [`publish`](Self::publish) swaps the pointer.
    pub async fn write_generation(
        &self,
        generation: u64,
        manifest: &CollectionManifest,
        records: &[ChunkRecord],
    ) -> Result<(), StoreError> {
        let paths = CollectionPaths::new(&manifest.name);

        // Leftovers from an earlier failed build of the same generation.
        self.remove_generation(&manifest.name, generation).await?;

        for (index, segment) in records.chunks(self.segment_size).enumerate() {
            let data = CborEncoder::encode_segment(segment)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            self.storage.put(&paths.segment(generation, index), data).await?;
        }

        let data = CborEncoder::encode(manifest).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.storage.put(&paths.manifest(generation), data).await?;

        debug!(
            collection = %manifest.name,
            generation,
            segments = manifest.segment_count,
            "wrote collection generation"
        );
        Ok(())
    }

    pub async fn publish(&self, name: &str, pointer: &CurrentPointer) -> Result<(), StoreError> {
        let data = CborEncoder::encode(pointer).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.storage.put(&CollectionPaths::new(name).current(), data).await?;
        Ok(())
    }

    pub async fn remove_pointer(&self, name: &str) -> Result<(), StoreError> {
        self.storage.delete(&CollectionPaths::new(name).current()).await?;
        Ok(())
    }

    pub async fn remove_generation(&self, name: &str, generation: u64) -> Result<(), StoreError> {
        let prefix = CollectionPaths::new(name).generation_prefix(generation);
        for key in self.storage.list(&prefix).await? {
            self.storage.delete(&key).await?;
        }
        Ok(())
    }

    /// Highest generation with any files under the collection, published or not.
    pub async fn latest_generation(&self, name: &str) -> Result<Option<u64>, StoreError> {
        let paths = CollectionPaths::new(name);
        let keys = self.storage.list(&paths.root()).await?;
        Ok(keys.iter().filter_map(|key| paths.generation_of(key)).max())
    }

    /// Removes every generation other than `keep`. Failures are logged, not
    /// returned: stale generations are invisible once the pointer moved.
    pub async fn remove_stale_generations(&self, name: &str, keep: Option<u64>) {
        let paths = CollectionPaths::new(name);
        let keys = match self.storage.list(&paths.root()).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(collection = name, error = %e, "could not list generations for cleanup");
                return;
            }
        };

        let stale: BTreeSet<u64> = keys
            .iter()
            .filter_map(|key| paths.generation_of(key))
            .filter(|generation| Some(*generation) != keep)
            .collect();

        for generation in stale {
            if let Err(e) = self.remove_generation(name, generation).await {
                warn!(collection = name, generation, error = %e, "failed to remove stale generation");
            }
        }
    }

    pub async fn load_manifest(
        &self,
        name: &str,
        generation: u64,
    ) -> Result<CollectionManifest, StoreError> {
        let key = CollectionPaths::new(name).manifest(generation);
        let data = self.storage.get(&key).await?.ok_or_else(|| {
            StoreError::Integrity(format!("manifest missing for generation {}", generation))
        })?;
        let manifest: CollectionManifest =
            CborDecoder::decode(&data).map_err(|e| StoreError::Serialization(e.to_string()))?;

        if manifest.version != COLLECTION_FORMAT_VERSION {
            return Err(StoreError::IncompatibleVersion {
                found: manifest.version,
                expected: COLLECTION_FORMAT_VERSION,
            });
        }
        if manifest.name != name {
            return Err(StoreError::Integrity(format!(
                "manifest names collection '{}', expected '{}'",
                manifest.name, name
            )));
        }
        Ok(manifest)
    }

    /// Loads the current generation, or `None` if the collection does not exist.
    pub async fn load(&self, name: &str) -> Result<Option<LoadedCollection>, StoreError> {
        let pointer = match self.read_pointer(name).await? {
            Some(pointer) => pointer,
            None => return Ok(None),
        };
        let manifest = self.load_manifest(name, pointer.generation).await?;
        if manifest.build_id != pointer.build_id {
            return Err(StoreError::Integrity(format!(
                "pointer build {} does not match manifest build {}",
                pointer.build_id, manifest.build_id
            )));
        }

        let paths = CollectionPaths::new(name);
        let mut records = Vec::with_capacity(manifest.chunk_count);
        for index in 0..manifest.segment_count {
            let key = paths.segment(pointer.generation, index);
            let data = self
                .storage
                .get(&key)
                .await?
                .ok_or_else(|| StoreError::Integrity(format!("segment {} not found", key)))?;
            let segment =
                CborDecoder::decode_segment(&data).map_err(|e| StoreError::Serialization(e.to_string()))?;
            records.extend(segment);
        }

        if records.len() != manifest.chunk_count {
            return Err(StoreError::Integrity(format!(
                "expected {} chunks, found {}",
                manifest.chunk_count,
                records.len()
            )));
        }
        if let Some(bad) = records
            .iter()
            .find(|r| r.vector.dimension() != manifest.dimension)
        {
            return Err(StoreError::Integrity(format!(
                "{} has dimension {}, collection dimension is {}",
                bad.chunk.id,
                bad.vector.dimension(),
                manifest.dimension
            )));
        }
        records.sort_by_key(|r| r.chunk.id);

        Ok(Some(LoadedCollection {
            manifest,
            pointer,
            records,
        }))
    }

    pub async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let prefix = CollectionPaths::collections_prefix();
        let names = self
            .storage
            .list(&prefix)
            .await?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(&prefix)?
                    .strip_suffix("/CURRENT")
                    .filter(|name| !name.contains('/'))
                    .map(str::to_string)
            })
            .collect();
        Ok(names)
    }
}
