// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Flat key/value persistence used by the vector store.
///
/// Keys are `/`-separated relative paths. `put` must replace the value for a
/// key atomically: a reader sees either the old or the new bytes.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError>;
    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    /// All keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        (**self).put(key, data).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        (**self).list(prefix).await
    }
}

// In-memory storage for tests, with put-failure injection
#[derive(Clone, Default)]
pub struct MockStorage {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    call_count: Arc<RwLock<HashMap<String, usize>>>,
    puts: Arc<AtomicUsize>,
    fail_after_puts: Arc<RwLock<Option<usize>>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `put` after the next `n` successful ones fails until cleared.
    pub async fn fail_puts_after(&self, n: usize) {
        self.puts.store(0, Ordering::SeqCst);
        *self.fail_after_puts.write().await = Some(n);
    }

    pub async fn clear_failures(&self) {
        *self.fail_after_puts.write().await = None;
    }

    pub async fn get_count(&self, key: &str) -> usize {
        self.call_count.read().await.get(key).copied().unwrap_or(0)
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut counts = self.call_count.write().await;
        *counts.entry(key.to_string()).or_insert(0) += 1;

        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        if let Some(limit) = *self.fail_after_puts.read().await {
            if self.puts.load(Ordering::SeqCst) >= limit {
                return Err(StorageError::Injected(format!("put {}", key)));
            }
        }
        self.puts.fetch_add(1, Ordering::SeqCst);

        let mut storage = self.data.write().await;
        storage.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut storage = self.data.write().await;
        storage.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let data = self.data.read().await;
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
