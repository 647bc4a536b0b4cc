use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request to '{endpoint}' failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("embedding provider returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("embedding response malformed: {reason}")]
    MalformedResponse { reason: String },

    #[error("embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("embedding call exhausted {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}
