//! Configuration error types.

use thiserror::Error;

use crate::cache::CacheNamespace;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric environment variable could not be parsed.
    #[error("failed to parse '{name}' value '{value}': {source}")]
    ParseError {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// A float environment variable could not be parsed.
    #[error("failed to parse '{name}' value '{value}': {source}")]
    FloatParseError {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    /// A hybrid weight was outside [0, 1].
    #[error("invalid hybrid weight '{name}' = {value}: must be in [0, 1]")]
    InvalidWeight { name: &'static str, value: f32 },

    /// Embedding dimension must be non-zero.
    #[error("invalid embedding dimension: must be greater than 0")]
    InvalidEmbeddingDim,

    /// A cache namespace was referenced without a registered policy.
    ///
    /// Raised at startup when the policy registry is built; the engine
    /// never runs with a partially-populated policy table.
    #[error("no cache policy registered for namespace '{namespace}'")]
    MissingNamespacePolicy { namespace: CacheNamespace },
}
