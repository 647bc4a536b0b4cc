use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by vector index operations.
pub enum VectorIndexError {
    /// Could not connect to the index endpoint.
    #[error("failed to connect to vector index at '{url}': {message}")]
    ConnectionFailed { url: String, message: String },

    /// A query against a namespace failed.
    #[error("query failed in namespace '{namespace}': {message}")]
    QueryFailed { namespace: String, message: String },

    /// The index does not support sparse queries for this namespace.
    ///
    /// Not a fault: callers are expected to fall back to a keyword
    /// query.
    #[error("sparse queries unsupported in namespace '{namespace}'")]
    SparseUnsupported { namespace: String },

    /// Upsert failed.
    #[error("failed to upsert into namespace '{namespace}': {message}")]
    UpsertFailed { namespace: String, message: String },

    /// Namespace deletion failed.
    #[error("failed to delete namespace '{namespace}': {message}")]
    DeleteFailed { namespace: String, message: String },

    /// Namespace does not exist.
    #[error("namespace not found: {namespace}")]
    NamespaceNotFound { namespace: String },

    /// Vector dimension mismatch.
    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}
