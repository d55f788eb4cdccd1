// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use anyhow::Result;
use serde::Serialize;
use serde_cbor::ser::Serializer;
use crate::store::collection::ChunkRecord;

/// zstd level used for segment files.
pub const SEGMENT_COMPRESSION_LEVEL: i32 = 3;

pub struct CborEncoder;

impl CborEncoder {
    /// Encode any serializable value as self-describing CBOR
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut ser = Serializer::new(&mut buf);
        ser.self_describe()?;
        value.serialize(&mut ser)?;
        Ok(buf)
    }

    /// Encode a batch of chunk records into a compressed segment
    pub fn encode_segment(records: &[ChunkRecord]) -> Result<Vec<u8>> {
        let encoded = Self::encode(records)?;
        Self::compress(&encoded)
    }

    /// Compress CBOR data using zstd
    pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
        let compressed = zstd::encode_all(data, SEGMENT_COMPRESSION_LEVEL)?;
        Ok(compressed)
    }
}
