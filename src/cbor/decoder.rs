// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use anyhow::Result;
use serde::de::DeserializeOwned;
use crate::store::collection::ChunkRecord;

pub struct CborDecoder;

impl CborDecoder {
    /// Decode any type that implements DeserializeOwned
    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        let value = serde_cbor::from_slice(data)?;
        Ok(value)
    }

    /// Decode a compressed segment back into its chunk records
    pub fn decode_segment(data: &[u8]) -> Result<Vec<ChunkRecord>> {
        let decompressed = Self::decompress(data)?;
        Self::decode(&decompressed)
    }

    /// Decompress CBOR data using zstd
    pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        let decompressed = zstd::decode_all(data)?;
        Ok(decompressed)
    }
}
