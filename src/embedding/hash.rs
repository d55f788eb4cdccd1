// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;

use super::{EmbedError, Embedder, EmbedderIdentity};

pub const HASH_EMBEDDER_MODEL: &str = "blake3-feature-hash-v1";
pub const DEFAULT_HASH_DIMENSION: usize = 384;

/// Offline embedder based on the hashing trick.
///
/// Each lowercase alphanumeric token and each adjacent token pair is hashed
/// with blake3 into a signed bucket; the resulting vector is L2 normalized.
/// Texts sharing vocabulary land close together under cosine distance, which
/// is enough for keyword-flavoured retrieval without a model server.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbedError> {
        if dimension == 0 {
            return Err(EmbedError::InvalidResponse(
                "hash embedder dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        for token in &tokens {
            self.accumulate(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let joined = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, joined.as_bytes(), 0.5);
        }

        let norm = crate::core::vector_ops::magnitude(&vector);
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = blake3::hash(feature);
        let bytes = hash.as_bytes();
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(index_bytes) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASH_DIMENSION,
        }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_sync(text))
    }

    fn identity(&self) -> EmbedderIdentity {
        EmbedderIdentity::new(HASH_EMBEDDER_MODEL, self.dimension)
    }
}
