// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::chunker::{validate_window, ChunkError, LinePreprocessor};
use crate::core::types::DistanceMetric;
use crate::embedding::hash::DEFAULT_HASH_DIMENSION;
use crate::embedding::{HttpEmbedderConfig, RetryConfig};
use crate::query::DEFAULT_WRAP_WIDTH;
use crate::store::collection::validate_collection_name;
use crate::store::{StoreError, StoreOptions};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Offline feature-hashing embedder.
    #[default]
    Hash,
    /// OpenAI-compatible HTTP endpoint.
    Http,
}

impl fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbedderKind::Hash => f.write_str("hash"),
            EmbedderKind::Http => f.write_str("http"),
        }
    }
}

impl FromStr for EmbedderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hash" => Ok(EmbedderKind::Hash),
            "http" | "openai" => Ok(EmbedderKind::Http),
            other => Err(format!("unknown embedder '{}', expected hash or http", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedderSettings {
    pub kind: EmbedderKind,
    pub url: String,
    pub model: String,
    pub dimension: usize,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Attempts per embed call, including the first.
    pub retries: usize,
    pub concurrency: usize,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        let http = HttpEmbedderConfig::default();
        Self {
            kind: EmbedderKind::default(),
            url: http.base_url,
            model: http.model,
            dimension: DEFAULT_HASH_DIMENSION,
            api_key: None,
            timeout_secs: 30,
            retries: 3,
            concurrency: 4,
        }
    }
}

impl EmbedderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn http_config(&self) -> HttpEmbedderConfig {
        HttpEmbedderConfig {
            base_url: self.url.clone(),
            model: self.model.clone(),
            dimension: self.dimension,
            api_key: self.api_key.clone(),
            timeout: self.timeout(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retries.max(1),
            attempt_timeout: Some(self.timeout()),
            use_jitter: true,
            ..RetryConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub input_path: PathBuf,
    pub db_dir: PathBuf,
    pub collection: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub metric: DistanceMetric,
    pub preprocess: LinePreprocessor,
    /// Label stored as the `source` metadata; defaults to the input file name.
    pub source_label: Option<String>,
    pub wrap_width: usize,
    pub embedder: EmbedderSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("input.txt"),
            db_dir: PathBuf::from("vector_db"),
            collection: "constitution".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 3,
            metric: DistanceMetric::Cosine,
            preprocess: LinePreprocessor::PipeColumn,
            source_label: None,
            wrap_width: DEFAULT_WRAP_WIDTH,
            embedder: EmbedderSettings::default(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map(Some).map_err(|e| {
            ConfigError::InvalidConfiguration(format!("{}='{}': {}", key, raw, e))
        }),
        _ => Ok(None),
    }
}

impl EngineConfig {
    /// Defaults overridden by `VECTOR_DB_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<PathBuf>("VECTOR_DB_INPUT")? {
            config.input_path = v;
        }
        if let Some(v) = env_parse::<PathBuf>("VECTOR_DB_DIR")? {
            config.db_dir = v;
        }
        if let Some(v) = env_parse::<String>("VECTOR_DB_COLLECTION")? {
            config.collection = v;
        }
        if let Some(v) = env_parse("VECTOR_DB_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = env_parse("VECTOR_DB_CHUNK_OVERLAP")? {
            config.chunk_overlap = v;
        }
        if let Some(v) = env_parse("VECTOR_DB_TOP_K")? {
            config.top_k = v;
        }
        if let Some(v) = env_parse("VECTOR_DB_METRIC")? {
            config.metric = v;
        }
        if let Some(v) = env_parse("VECTOR_DB_PREPROCESS")? {
            config.preprocess = v;
        }
        if let Some(v) = env_parse::<String>("VECTOR_DB_SOURCE_LABEL")? {
            config.source_label = Some(v);
        }
        if let Some(v) = env_parse("VECTOR_DB_WRAP_WIDTH")? {
            config.wrap_width = v;
        }

        let embedder = &mut config.embedder;
        if let Some(v) = env_parse("VECTOR_DB_EMBEDDER")? {
            embedder.kind = v;
        }
        if let Some(v) = env_parse::<String>("VECTOR_DB_EMBEDDING_URL")? {
            embedder.url = v;
        }
        if let Some(v) = env_parse::<String>("VECTOR_DB_EMBEDDING_MODEL")? {
            embedder.model = v;
        }
        if let Some(v) = env_parse("VECTOR_DB_EMBEDDING_DIMENSION")? {
            embedder.dimension = v;
        }
        if let Some(v) = env_parse::<String>("OPENAI_API_KEY")? {
            embedder.api_key = Some(v);
        }
        if let Some(v) = env_parse("VECTOR_DB_EMBED_TIMEOUT_SECS")? {
            embedder.timeout_secs = v;
        }
        if let Some(v) = env_parse("VECTOR_DB_EMBED_RETRIES")? {
            embedder.retries = v;
        }
        if let Some(v) = env_parse("VECTOR_DB_EMBED_CONCURRENCY")? {
            embedder.concurrency = v;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> {
            Err(ConfigError::InvalidConfiguration(msg))
        };

        if let Err(ChunkError::InvalidConfiguration(msg)) =
            validate_window(self.chunk_size, self.chunk_overlap)
        {
            return invalid(msg);
        }
        if let Err(e) = validate_collection_name(&self.collection) {
            return invalid(match e {
                StoreError::InvalidConfiguration(msg) => msg,
                other => other.to_string(),
            });
        }
        if self.top_k == 0 {
            return invalid("top_k must be greater than zero".to_string());
        }
        if self.wrap_width == 0 {
            return invalid("wrap width must be greater than zero".to_string());
        }
        if self.embedder.dimension == 0 {
            return invalid("embedding dimension must be greater than zero".to_string());
        }
        if self.embedder.concurrency == 0 {
            return invalid("embed concurrency must be greater than zero".to_string());
        }
        if self.embedder.timeout_secs == 0 {
            return invalid("embed timeout must be greater than zero".to_string());
        }
        if self.embedder.kind == EmbedderKind::Http
            && !self.embedder.url.starts_with("http://")
            && !self.embedder.url.starts_with("https://")
        {
            return invalid(format!(
                "embedding URL '{}' must start with http:// or https://",
                self.embedder.url
            ));
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            embed_concurrency: self.embedder.concurrency,
            ..StoreOptions::default()
        }
    }
}
