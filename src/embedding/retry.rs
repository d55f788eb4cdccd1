// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use super::{embed_with_timeout, EmbedError, Embedder, EmbedderIdentity};

// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Upper bound for each individual attempt.
    pub attempt_timeout: Option<Duration>,
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            attempt_timeout: Some(Duration::from_secs(30)),
            use_jitter: false,
        }
    }
}

/// Retries transient embedder failures with exponential backoff.
///
/// Only [`EmbedError::is_retryable`] errors are retried; anything else, or the
/// last transient error once the attempt budget is spent, is returned as is.
pub struct RetryEmbedder<E> {
    inner: E,
    config: RetryConfig,
}

impl<E: Embedder> RetryEmbedder<E> {
    pub fn new(inner: E, max_attempts: usize) -> Self {
        let config = RetryConfig {
            max_attempts,
            ..RetryConfig::default()
        };
        Self { inner, config }
    }

    pub fn with_config(inner: E, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn with_jitter(inner: E, max_attempts: usize) -> Self {
        let mut embedder = Self::new(inner, max_attempts);
        embedder.config.use_jitter = true;
        embedder
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl<E: Embedder> Embedder for RetryEmbedder<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;
        let mut delay = self.config.initial_delay;

        loop {
            attempts += 1;

            match embed_with_timeout(&self.inner, text, self.config.attempt_timeout).await {
                Ok(vector) => return Ok(vector),
                Err(e) if !e.is_retryable() || attempts >= max_attempts => return Err(e),
                Err(e) => {
                    warn!(attempt = attempts, max_attempts, error = %e, "retrying embed call");

                    // Apply jitter if enabled
                    let mut actual_delay = delay;
                    if self.config.use_jitter {
                        let jitter = Duration::from_millis(
                            (rand::random::<f64>() * delay.as_millis() as f64 * 0.3) as u64,
                        );
                        actual_delay = delay + jitter;
                    }

                    sleep(actual_delay).await;

                    // Calculate next delay with exponential backoff
                    let next_delay = Duration::from_millis(
                        (delay.as_millis() as f64 * self.config.exponential_base) as u64,
                    );
                    delay = next_delay.min(self.config.max_delay);
                }
            }
        }
    }

    fn identity(&self) -> EmbedderIdentity {
        self.inner.identity()
    }
}
