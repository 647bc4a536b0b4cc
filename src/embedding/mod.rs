//! Embedding provider client.
//!
//! Talks to an OpenAI-compatible `/v1/embeddings` endpoint over HTTP.
//! Long inputs are chunked and averaged ([`chunk`]); transient failures
//! get a small bounded retry with exponential backoff.

pub mod chunk;
pub mod error;

pub use error::EmbeddingError;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use chunk::{average_vectors, chunk_text};

/// Turns text into dense vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embeds a batch of texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Settings for [`HttpEmbedder`].
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    /// Inputs longer than this are chunked and averaged.
    pub max_input_chars: usize,
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Retries after the first attempt. `0` disables retry.
    pub max_retries: u32,
}

impl EmbedderConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            endpoint: config.embedding_endpoint.clone(),
            api_key: config.embedding_api_key.clone(),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dim,
            max_input_chars: config.embedding_max_chars,
            timeout: config.call_timeout,
            max_retries: config.embedding_max_retries,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// HTTP client for an OpenAI-compatible embedding endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbedderConfig,
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl HttpEmbedder {
    pub fn new(config: EmbedderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// One POST to the provider, no retry, order restored by response
    /// index.
    async fn request_embeddings(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = EmbeddingRequest {
            model: &self.config.model,
            input: inputs,
        };

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .timeout(self.config.timeout)
            .json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                }
            } else {
                EmbeddingError::RequestFailed {
                    endpoint: self.config.endpoint.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::MalformedResponse {
                    reason: e.to_string(),
                })?;

        if parsed.data.len() != inputs.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: inputs.len(),
                actual: parsed.data.len(),
            });
        }

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        let mut vectors = Vec::with_capacity(data.len());
        for datum in data {
            if datum.embedding.len() != self.config.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.config.dimension,
                    actual: datum.embedding.len(),
                });
            }
            vectors.push(datum.embedding);
        }
        Ok(vectors)
    }

    /// Bounded retry with exponential backoff (250ms, 500ms, 1s, ...).
    ///
    /// Client-side errors (bad status below 500) are not retried; the
    /// provider already rejected the request deterministically.
    async fn request_with_retry(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let attempts = self.config.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = Duration::from_millis(250 * (1u64 << (attempt - 1)));
                debug!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying embedding call");
                tokio::time::sleep(backoff).await;
            }

            match self.request_embeddings(inputs).await {
                Ok(vectors) => return Ok(vectors),
                Err(e @ EmbeddingError::BadStatus { status, .. }) if status < 500 => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "embedding call failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(EmbeddingError::RetriesExhausted {
            attempts,
            last_error,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let chunks = chunk_text(text, self.config.max_input_chars);
        debug!(chunks = chunks.len(), "embedding input");

        let vectors = self.request_with_retry(&chunks).await?;
        if vectors.len() == 1 {
            let mut vectors = vectors;
            return Ok(vectors.remove(0));
        }
        Ok(average_vectors(&vectors))
    }

    #[instrument(skip(self, texts), fields(batch = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Oversized batch members are embedded individually through the
        // chunk-and-average path; the rest go out in one request.
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut direct_inputs = Vec::new();
        let mut direct_slots = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if text.chars().count() > self.config.max_input_chars {
                results[i] = Some(self.embed(text).await?);
            } else {
                direct_inputs.push(text.clone());
                direct_slots.push(i);
            }
        }

        if !direct_inputs.is_empty() {
            let vectors = self.request_with_retry(&direct_inputs).await?;
            for (slot, vector) in direct_slots.into_iter().zip(vectors) {
                results[slot] = Some(vector);
            }
        }

        Ok(results
            .into_iter()
            .map(|v| v.expect("every slot filled by direct or chunked path"))
            .collect())
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock::MockEmbedder;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    /// Deterministic embedder for tests.
    ///
    /// Vectors are derived from a BLAKE3 digest of the text, so equal
    /// texts embed identically and distinct texts differ. Can be
    /// switched into an always-failing mode.
    pub struct MockEmbedder {
        dimension: usize,
        failing: AtomicBool,
        call_count: AtomicU64,
    }

    impl MockEmbedder {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                failing: AtomicBool::new(false),
                call_count: AtomicU64::new(0),
            }
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::Relaxed);
        }

        pub fn call_count(&self) -> u64 {
            self.call_count.load(Ordering::Relaxed)
        }

        fn vector_for(&self, text: &str) -> Vec<f32> {
            let digest = blake3::hash(text.as_bytes());
            let bytes = digest.as_bytes();
            (0..self.dimension)
                .map(|i| (bytes[i % 32] as f32 / 255.0) * 2.0 - 1.0 + (i as f32 * 1e-4))
                .collect()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.call_count.fetch_add(1, Ordering::Relaxed);
            if self.failing.load(Ordering::Relaxed) {
                return Err(EmbeddingError::RequestFailed {
                    endpoint: "mock".to_string(),
                    reason: "mock embedder in failing mode".to_string(),
                });
            }
            Ok(self.vector_for(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }
}
