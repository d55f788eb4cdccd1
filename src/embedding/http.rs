// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{EmbedError, Embedder, EmbedderIdentity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpEmbedderConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `http://localhost:8000/v1`.
    pub base_url: String,
    pub model: String,
    /// Dimension the model is expected to produce.
    pub dimension: usize,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for HttpEmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    config: HttpEmbedderConfig,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self, EmbedError> {
        if config.model.trim().is_empty() {
            return Err(EmbedError::InvalidResponse("missing embedding model name".into()));
        }
        if config.dimension == 0 {
            return Err(EmbedError::InvalidResponse(
                "embedding dimension must be greater than zero".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_transport_error(&self, err: reqwest::Error) -> EmbedError {
        if err.is_timeout() {
            EmbedError::Timeout(self.config.timeout)
        } else {
            EmbedError::Unavailable(err.to_string())
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: [text],
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key.trim());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            warn!(%status, endpoint = %self.endpoint, "embedding request failed");
            let message = format!("{} returned {}: {}", self.endpoint, status, body);
            return Err(
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    EmbedError::Unavailable(message)
                } else {
                    EmbedError::InvalidResponse(message)
                },
            );
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(format!("malformed body: {}", e)))?;

        let embedding = parsed
            .data
            .into_iter()
            .min_by_key(|entry| entry.index)
            .map(|entry| entry.embedding)
            .ok_or_else(|| EmbedError::InvalidResponse("response contained no embeddings".into()))?;

        debug!(dimension = embedding.len(), "received embedding");
        Ok(embedding)
    }

    fn identity(&self) -> EmbedderIdentity {
        EmbedderIdentity::new(self.config.model.clone(), self.config.dimension)
    }
}
