// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Splits source text into overlapping fixed-size chunks.
//!
//! Sizes and offsets are counted in characters. Windows of `size` characters
//! start every `size - overlap` characters; the sequence ends with the first
//! window that reaches the end of the cleaned text, so consecutive chunks
//! always share exactly `overlap` characters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::core::types::{Chunk, ChunkId, ChunkMetadata, MetadataValue};

pub const DEFAULT_SOURCE: &str = "document";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Line normalization applied before chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinePreprocessor {
    /// Keep only the text after the first `|` of a line, trimmed. Lines
    /// without a pipe are trimmed and kept.
    #[default]
    PipeColumn,
    /// Trim every line.
    Trim,
    /// Leave the text untouched.
    None,
}

impl LinePreprocessor {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinePreprocessor::PipeColumn => "pipe",
            LinePreprocessor::Trim => "trim",
            LinePreprocessor::None => "none",
        }
    }
}

impl fmt::Display for LinePreprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinePreprocessor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pipe" | "pipe_column" => Ok(LinePreprocessor::PipeColumn),
            "trim" => Ok(LinePreprocessor::Trim),
            "none" | "raw" => Ok(LinePreprocessor::None),
            other => Err(format!(
                "unknown preprocessor '{}', expected pipe, trim or none",
                other
            )),
        }
    }
}

pub fn clean_text(raw: &str, preprocessor: LinePreprocessor) -> String {
    match preprocessor {
        LinePreprocessor::None => raw.to_string(),
        LinePreprocessor::Trim => raw.split('\n').map(str::trim).collect::<Vec<_>>().join("\n"),
        LinePreprocessor::PipeColumn => raw
            .split('\n')
            .map(|line| match line.split_once('|') {
                Some((_, rest)) => rest.trim(),
                None => line.trim(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub fn validate_window(size: usize, overlap: usize) -> Result<(), ChunkError> {
    if overlap == 0 || overlap >= size {
        return Err(ChunkError::InvalidConfiguration(format!(
            "chunk overlap ({}) must satisfy 0 < overlap < chunk size ({})",
            overlap, size
        )));
    }
    Ok(())
}

/// Chunks `raw_text` with the default pipe-column preprocessing.
pub fn chunk(raw_text: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>, ChunkError> {
    Ok(Chunker::new(size, overlap)?.chunk(raw_text))
}

#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
    preprocessor: LinePreprocessor,
    source: String,
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkError> {
        validate_window(size, overlap)?;
        Ok(Self {
            size,
            overlap,
            preprocessor: LinePreprocessor::default(),
            source: DEFAULT_SOURCE.to_string(),
        })
    }

    pub fn with_preprocessor(mut self, preprocessor: LinePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Label recorded as the `source` metadata of every chunk.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn chunk(&self, raw_text: &str) -> Vec<Chunk> {
        let cleaned = clean_text(raw_text, self.preprocessor);
        self.split(&cleaned)
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let mut metadata = ChunkMetadata::new();
                metadata.insert("source".to_string(), MetadataValue::from(self.source.as_str()));
                metadata.insert("chunk_id".to_string(), MetadataValue::Int(index as i64));
                Chunk::with_metadata(ChunkId::new(index as u64), text, metadata)
            })
            .collect()
    }

    /// Window boundaries over already-cleaned text.
    pub fn split(&self, cleaned: &str) -> Vec<String> {
        // Byte offset of every char boundary, including the end.
        let offsets: Vec<usize> = cleaned
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(cleaned.len()))
            .collect();
        let char_len = offsets.len() - 1;
        let step = self.size - self.overlap;

        let mut windows = Vec::new();
        let mut start = 0;
        while start < char_len {
            let end = (start + self.size).min(char_len);
            windows.push(cleaned[offsets[start]..offsets[end]].to_string());
            if end == char_len {
                break;
            }
            start += step;
        }
        windows
    }
}
