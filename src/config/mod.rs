//! Environment-backed configuration.
//!
//! Most settings have defaults. Override with `RECALL_*` environment
//! variables.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::env;
use std::time::Duration;

use crate::fusion::HybridWeights;

/// Core configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `RECALL_*` overrides on top of
/// defaults. Cache namespace policies are compiled in (see
/// [`crate::cache::default_policies`]); this struct carries connection
/// and tuning settings only.
#[derive(Debug, Clone)]
pub struct Config {
    /// Qdrant endpoint URL. Default: `http://localhost:6334`.
    pub qdrant_url: String,

    /// Redis endpoint URL for the L2 cache tier. Default:
    /// `redis://127.0.0.1:6379`.
    pub redis_url: String,

    /// Embedding provider endpoint (OpenAI-compatible `/v1/embeddings`).
    /// Default: `http://localhost:8000/v1/embeddings`.
    pub embedding_endpoint: String,

    /// API key sent as a bearer token to the embedding provider, if set.
    pub embedding_api_key: Option<String>,

    /// Embedding model name. Default: `text-embedding-3-small`.
    pub embedding_model: String,

    /// Embedding vector dimension. Default: `1536`.
    pub embedding_dim: usize,

    /// Max input length (chars) before chunk-and-average. Default: `8000`.
    pub embedding_max_chars: usize,

    /// Bounded retry count for embedding calls. Default: `2`.
    pub embedding_max_retries: u32,

    /// Default hybrid fusion weights. Default: `0.7 / 0.3` (dense-biased).
    pub default_weights: HybridWeights,

    /// Whether reranking runs at all. Default: `true`.
    pub rerank_enabled: bool,

    /// Score floor applied after reranking. Default: `0.1`.
    pub rerank_threshold: f32,

    /// Deadline for every external call (embedding, index, L2).
    /// Default: `5s`.
    pub call_timeout: Duration,
}

/// Default Qdrant URL used when `RECALL_QDRANT_URL` is not set.
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Default Redis URL used when `RECALL_REDIS_URL` is not set.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            embedding_endpoint: "http://localhost:8000/v1/embeddings".to_string(),
            embedding_api_key: None,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dim: 1536,
            embedding_max_chars: 8000,
            embedding_max_retries: 2,
            default_weights: HybridWeights::new(0.7, 0.3),
            rerank_enabled: true,
            rerank_threshold: 0.1,
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    const ENV_QDRANT_URL: &'static str = "RECALL_QDRANT_URL";
    const ENV_REDIS_URL: &'static str = "RECALL_REDIS_URL";
    const ENV_EMBEDDING_ENDPOINT: &'static str = "RECALL_EMBEDDING_ENDPOINT";
    const ENV_EMBEDDING_API_KEY: &'static str = "RECALL_EMBEDDING_API_KEY";
    const ENV_EMBEDDING_MODEL: &'static str = "RECALL_EMBEDDING_MODEL";
    const ENV_EMBEDDING_DIM: &'static str = "RECALL_EMBEDDING_DIM";
    const ENV_EMBEDDING_MAX_CHARS: &'static str = "RECALL_EMBEDDING_MAX_CHARS";
    const ENV_EMBEDDING_MAX_RETRIES: &'static str = "RECALL_EMBEDDING_MAX_RETRIES";
    const ENV_DENSE_WEIGHT: &'static str = "RECALL_DENSE_WEIGHT";
    const ENV_SPARSE_WEIGHT: &'static str = "RECALL_SPARSE_WEIGHT";
    const ENV_RERANK_ENABLED: &'static str = "RECALL_RERANK_ENABLED";
    const ENV_RERANK_THRESHOLD: &'static str = "RECALL_RERANK_THRESHOLD";
    const ENV_CALL_TIMEOUT_MS: &'static str = "RECALL_CALL_TIMEOUT_MS";

    /// Loads configuration from environment variables (falling back to
    /// defaults), then validates it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let dense = Self::parse_f32_from_env(Self::ENV_DENSE_WEIGHT, defaults.default_weights.dense)?;
        let sparse =
            Self::parse_f32_from_env(Self::ENV_SPARSE_WEIGHT, defaults.default_weights.sparse)?;

        let config = Self {
            qdrant_url: Self::parse_string_from_env(Self::ENV_QDRANT_URL, defaults.qdrant_url),
            redis_url: Self::parse_string_from_env(Self::ENV_REDIS_URL, defaults.redis_url),
            embedding_endpoint: Self::parse_string_from_env(
                Self::ENV_EMBEDDING_ENDPOINT,
                defaults.embedding_endpoint,
            ),
            embedding_api_key: Self::parse_optional_string_from_env(Self::ENV_EMBEDDING_API_KEY),
            embedding_model: Self::parse_string_from_env(
                Self::ENV_EMBEDDING_MODEL,
                defaults.embedding_model,
            ),
            embedding_dim: Self::parse_usize_from_env(
                Self::ENV_EMBEDDING_DIM,
                defaults.embedding_dim,
            )?,
            embedding_max_chars: Self::parse_usize_from_env(
                Self::ENV_EMBEDDING_MAX_CHARS,
                defaults.embedding_max_chars,
            )?,
            embedding_max_retries: Self::parse_usize_from_env(
                Self::ENV_EMBEDDING_MAX_RETRIES,
                defaults.embedding_max_retries as usize,
            )? as u32,
            default_weights: HybridWeights::new(dense, sparse),
            rerank_enabled: Self::parse_bool_from_env(
                Self::ENV_RERANK_ENABLED,
                defaults.rerank_enabled,
            ),
            rerank_threshold: Self::parse_f32_from_env(
                Self::ENV_RERANK_THRESHOLD,
                defaults.rerank_threshold,
            )?,
            call_timeout: Duration::from_millis(Self::parse_usize_from_env(
                Self::ENV_CALL_TIMEOUT_MS,
                defaults.call_timeout.as_millis() as usize,
            )? as u64),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates basic invariants (weight ranges, non-zero dimension).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.default_weights.dense) {
            return Err(ConfigError::InvalidWeight {
                name: Self::ENV_DENSE_WEIGHT,
                value: self.default_weights.dense,
            });
        }
        if !(0.0..=1.0).contains(&self.default_weights.sparse) {
            return Err(ConfigError::InvalidWeight {
                name: Self::ENV_SPARSE_WEIGHT,
                value: self.default_weights.sparse,
            });
        }
        if self.embedding_dim == 0 {
            return Err(ConfigError::InvalidEmbeddingDim);
        }
        Ok(())
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    fn parse_optional_string_from_env(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_usize_from_env(var_name: &'static str, default: usize) -> Result<usize, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value.parse().map_err(|e| ConfigError::ParseError {
                name: var_name,
                value,
                source: e,
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_f32_from_env(var_name: &'static str, default: f32) -> Result<f32, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value.parse().map_err(|e| ConfigError::FloatParseError {
                name: var_name,
                value,
                source: e,
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_bool_from_env(var_name: &str, default: bool) -> bool {
        env::var(var_name)
            .ok()
            .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
            .unwrap_or(default)
    }
}
