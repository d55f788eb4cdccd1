// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedder capability consumed by the vector store.
//!
//! The store never knows which model produced a vector; it only records the
//! [`EmbedderIdentity`] used at build time and refuses queries embedded by a
//! different one.

pub mod hash;
pub mod http;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use hash::HashEmbedder;
pub use http::{HttpEmbedder, HttpEmbedderConfig};
pub use retry::{RetryConfig, RetryEmbedder};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbedError {
    #[error("Embedder timed out after {0:?}")]
    Timeout(Duration),

    #[error("Embedder unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid embedder response: {0}")]
    InvalidResponse(String),
}

impl EmbedError {
    /// Transient failures that may succeed when the same call is repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbedError::Timeout(_) | EmbedError::Unavailable(_))
    }
}

/// Which embedding function produced a vector: model name and output size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbedderIdentity {
    pub model: String,
    pub dimension: usize,
}

impl EmbedderIdentity {
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
        }
    }

    /// Short stable fingerprint for logs and diagnostics.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(format!("{}:{}", self.model, self.dimension).as_bytes());
        hex::encode(&hash.as_bytes()[..8])
    }
}

impl fmt::Display for EmbedderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (dim {})", self.model, self.dimension)
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    fn identity(&self) -> EmbedderIdentity;
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(text).await
    }

    fn identity(&self) -> EmbedderIdentity {
        (**self).identity()
    }
}

/// Runs one embed call, failing with [`EmbedError::Timeout`] if it takes
/// longer than `timeout`.
pub async fn embed_with_timeout<E: Embedder + ?Sized>(
    embedder: &E,
    text: &str,
    timeout: Option<Duration>,
) -> Result<Vec<f32>, EmbedError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, embedder.embed(text))
            .await
            .map_err(|_| EmbedError::Timeout(limit))?,
        None => embedder.embed(text).await,
    }
}
