// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt, TryStreamExt};
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::storage::Storage;
use crate::core::types::{Chunk, DistanceMetric, Embedding, SearchHit};
use crate::core::vector_ops;
use crate::embedding::{embed_with_timeout, Embedder, EmbedderIdentity};
use crate::store::collection::{
    validate_collection_name, ChunkRecord, CollectionInfo, CollectionManifest, CurrentPointer,
    LoadedCollection, COLLECTION_FORMAT_VERSION,
};
use crate::store::persistence::{CollectionPersister, DEFAULT_SEGMENT_SIZE};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    /// Embed calls in flight at once during a build.
    pub embed_concurrency: usize,
    /// Bound on every embed call issued by the store.
    pub embed_timeout: Option<Duration>,
    /// Records per persisted segment.
    pub segment_size: usize,
    /// Loaded collections kept in memory.
    pub cache_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            embed_concurrency: 4,
            embed_timeout: None,
            segment_size: DEFAULT_SEGMENT_SIZE,
            cache_capacity: 8,
        }
    }
}

/// Durable collections of embedded chunks with exact nearest-neighbor search.
///
/// A build stages every vector in memory, writes a fresh generation and only
/// then swaps the collection's `CURRENT` pointer, so readers observe either
/// the previous collection or the complete new one. Builds and deletes of a
/// name are exclusive; queries of the same name share a read lock.
pub struct VectorStore<S: Storage> {
    persister: CollectionPersister<S>,
    locks: DashMap<String, Arc<RwLock<()>>>,
    cache: Mutex<LruCache<String, Arc<LoadedCollection>>>,
    options: StoreOptions,
}

impl<S: Storage> VectorStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_options(storage, StoreOptions::default())
    }

    pub fn with_options(storage: S, options: StoreOptions) -> Self {
        let capacity = NonZeroUsize::new(options.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            persister: CollectionPersister::with_segment_size(storage, options.segment_size),
            locks: DashMap::new(),
            cache: Mutex::new(LruCache::new(capacity)),
            options,
        }
    }

    pub fn storage(&self) -> &S {
        self.persister.storage()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn lock_for(&self, name: &str) -> Arc<RwLock<()>> {
        self.locks.entry(name.to_string()).or_default().clone()
    }

    pub async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        validate_collection_name(name)?;
        let lock = self.lock_for(name);
        let _guard = lock.read().await;
        Ok(self.persister.read_pointer(name).await?.is_some())
    }

    pub async fn info(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError> {
        validate_collection_name(name)?;
        let lock = self.lock_for(name);
        let _guard = lock.read().await;
        match self.persister.read_pointer(name).await? {
            Some(pointer) => {
                let manifest = self.persister.load_manifest(name, pointer.generation).await?;
                Ok(Some(CollectionInfo::from_manifest(&manifest, pointer.generation)))
            }
            None => Ok(None),
        }
    }

    pub async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.persister.list_collections().await
    }

    /// Embeds `chunks` and replaces any existing collection called `name`.
    pub async fn build<E: Embedder + ?Sized>(
        &self,
        name: &str,
        chunks: &[Chunk],
        embedder: &E,
        metric: DistanceMetric,
    ) -> Result<CollectionInfo, StoreError> {
        validate_collection_name(name)?;
        if chunks.is_empty() {
            return Err(StoreError::InvalidConfiguration(format!(
                "cannot build collection '{}' from zero chunks",
                name
            )));
        }
        let mut seen = HashSet::with_capacity(chunks.len());
        if let Some(dup) = chunks.iter().find(|c| !seen.insert(c.id)) {
            return Err(StoreError::InvalidConfiguration(format!(
                "duplicate {} in build input",
                dup.id
            )));
        }

        let identity = embedder.identity();
        if identity.dimension == 0 {
            return Err(StoreError::InvalidConfiguration(format!(
                "embedder {} declares dimension 0",
                identity.model
            )));
        }

        info!(
            collection = name,
            chunks = chunks.len(),
            embedder = %identity,
            fingerprint = %identity.fingerprint(),
            "embedding chunks"
        );

        // Stage every vector before touching storage.
        let timeout = self.options.embed_timeout;
        let embeds: Vec<_> = chunks
            .iter()
            .map(|chunk| async move {
                embed_with_timeout(embedder, &chunk.text, timeout)
                    .await
                    .map_err(|source| StoreError::Embedding {
                        context: format!("embedding {}", chunk.id),
                        source,
                    })
            })
            .collect();
        let vectors: Vec<Vec<f32>> = stream::iter(embeds)
            .buffered(self.options.embed_concurrency.max(1))
            .try_collect()
            .await?;

        let mut records = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter().zip(vectors) {
            if vector.len() != identity.dimension {
                return Err(StoreError::EmbeddingFunctionMismatch {
                    collection: name.to_string(),
                    expected: identity.clone(),
                    actual: EmbedderIdentity::new(identity.model.clone(), vector.len()),
                });
            }
            let vector = Embedding::new(vector).map_err(|e| {
                StoreError::InvalidConfiguration(format!("{}: {}", chunk.id, e))
            })?;
            records.push(ChunkRecord {
                chunk: chunk.clone(),
                vector,
            });
        }
        records.sort_by_key(|r| r.chunk.id);

        let lock = self.lock_for(name);
        let _guard = lock.write().await;

        let (previous, replacing) = match self.persister.read_pointer(name).await {
            Ok(pointer) => (pointer, pointer.is_some()),
            Err(StoreError::Serialization(e)) => {
                warn!(collection = name, error = %e, "unreadable CURRENT pointer, replacing collection");
                (None, true)
            }
            Err(e) => return Err(e),
        };
        let newest = self.persister.latest_generation(name).await?;
        let generation = previous.map(|p| p.generation).max(newest).map_or(1, |g| g + 1);
        let pointer = CurrentPointer {
            generation,
            build_id: Uuid::new_v4(),
        };
        let segment_size = self.persister.segment_size();
        let manifest = CollectionManifest {
            version: COLLECTION_FORMAT_VERSION,
            name: name.to_string(),
            embedder: identity,
            metric,
            dimension: records[0].vector.dimension(),
            chunk_count: records.len(),
            segment_count: records.len().div_ceil(segment_size),
            segment_size,
            build_id: pointer.build_id,
            created_at: Utc::now(),
        };

        let staged = async {
            self.persister
                .write_generation(generation, &manifest, &records)
                .await?;
            self.persister.publish(name, &pointer).await
        };
        if let Err(e) = staged.await {
            warn!(collection = name, generation, error = %e, "build failed, keeping previous state");
            if let Err(cleanup) = self.persister.remove_generation(name, generation).await {
                warn!(collection = name, generation, error = %cleanup, "could not remove staged generation");
            }
            return Err(e);
        }

        self.persister
            .remove_stale_generations(name, Some(generation))
            .await;

        let loaded = Arc::new(LoadedCollection {
            manifest,
            pointer,
            records,
        });
        let info = loaded.info();
        self.cache.lock().await.put(name.to_string(), loaded);

        info!(
            collection = name,
            generation,
            chunks = info.chunk_count,
            replaced = replacing,
            "collection built"
        );
        Ok(info)
    }

    /// Ranks every stored chunk against `query_text` and returns the `k`
    /// nearest, ties broken by ascending chunk id.
    pub async fn query<E: Embedder + ?Sized>(
        &self,
        name: &str,
        query_text: &str,
        embedder: &E,
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        validate_collection_name(name)?;
        let lock = self.lock_for(name);
        let _guard = lock.read().await;

        let collection = self
            .load_current(name)
            .await?
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        let manifest = &collection.manifest;

        let identity = embedder.identity();
        if identity != manifest.embedder {
            return Err(StoreError::EmbeddingFunctionMismatch {
                collection: name.to_string(),
                expected: manifest.embedder.clone(),
                actual: identity,
            });
        }

        let vector = embed_with_timeout(embedder, query_text, self.options.embed_timeout)
            .await
            .map_err(|source| StoreError::Embedding {
                context: "embedding query".to_string(),
                source,
            })?;
        if vector.len() != manifest.dimension {
            return Err(StoreError::EmbeddingFunctionMismatch {
                collection: name.to_string(),
                expected: manifest.embedder.clone(),
                actual: EmbedderIdentity::new(identity.model, vector.len()),
            });
        }

        let k = k.min(collection.records.len());
        let ranked = vector_ops::nearest(
            &vector,
            collection
                .records
                .iter()
                .map(|r| (r.chunk.id, r.vector.as_slice())),
            manifest.metric,
            k,
        );

        debug!(collection = name, k, hits = ranked.len(), "query ranked");
        Ok(ranked
            .into_iter()
            .map(|(pos, distance)| SearchHit::new(collection.records[pos].chunk.clone(), distance))
            .collect())
    }

    /// Removes the collection. Returns `false` if it did not exist.
    pub async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        validate_collection_name(name)?;
        let lock = self.lock_for(name);
        let _guard = lock.write().await;

        let generation = match self.persister.read_pointer(name).await {
            Ok(Some(pointer)) => Some(pointer.generation),
            Ok(None) => return Ok(false),
            Err(StoreError::Serialization(e)) => {
                warn!(collection = name, error = %e, "unreadable CURRENT pointer, deleting anyway");
                None
            }
            Err(e) => return Err(e),
        };

        // Dropping the pointer hides the whole collection at once.
        self.persister.remove_pointer(name).await?;
        self.cache.lock().await.pop(name);
        self.persister.remove_stale_generations(name, None).await;

        info!(collection = name, ?generation, "collection deleted");
        Ok(true)
    }

    // Caller holds the collection lock.
    async fn load_current(&self, name: &str) -> Result<Option<Arc<LoadedCollection>>, StoreError> {
        let pointer = match self.persister.read_pointer(name).await? {
            Some(pointer) => pointer,
            None => {
                self.cache.lock().await.pop(name);
                return Ok(None);
            }
        };

        if let Some(cached) = self.cache.lock().await.get(name) {
            if cached.pointer == pointer {
                return Ok(Some(cached.clone()));
            }
        }

        match self.persister.load(name).await? {
            Some(loaded) => {
                let loaded = Arc::new(loaded);
                self.cache
                    .lock()
                    .await
                    .put(name.to_string(), loaded.clone());
                Ok(Some(loaded))
            }
            None => Ok(None),
        }
    }
}
