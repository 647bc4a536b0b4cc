//! Vector index client boundary.

pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod model;
pub mod qdrant;

pub use error::VectorIndexError;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockVectorIndex;
pub use model::{
    HitMetadata, IndexRecord, MetadataFilter, SearchHit, cosine_similarity, index_namespace,
};
pub use qdrant::QdrantIndex;

use async_trait::async_trait;

/// Namespaced external index supporting dense, sparse, and keyword
/// queries.
///
/// Sparse support is a capability, not a guarantee: implementations may
/// return [`VectorIndexError::SparseUnsupported`], and callers are
/// expected to degrade to [`VectorIndexClient::keyword_query`].
#[async_trait]
pub trait VectorIndexClient: Send + Sync {
    /// Top-K similarity query over dense vectors.
    async fn dense_query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: u64,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<SearchHit>, VectorIndexError>;

    /// Lexical/sparse query over the same namespace.
    async fn sparse_query(
        &self,
        namespace: &str,
        query: &str,
        top_k: u64,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<SearchHit>, VectorIndexError>;

    /// Plain keyword query, the lowest-common-denominator fallback.
    async fn keyword_query(
        &self,
        namespace: &str,
        terms: &[String],
        top_k: u64,
    ) -> Result<Vec<SearchHit>, VectorIndexError>;

    /// Inserts or replaces records by id.
    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<IndexRecord>,
    ) -> Result<(), VectorIndexError>;

    /// Drops an entire namespace.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), VectorIndexError>;
}
