//! Recall library crate: the retrieval-and-caching core of a
//! knowledge-assistant backend.
//!
//! # Public API Surface
//!
//! Consumers drive retrieval through [`RetrievalOrchestrator::search`]
//! and invalidation through [`RetrievalOrchestrator::invalidate`] /
//! [`CacheEngine`]; everything else is building blocks exposed for the
//! server binary and integration tests:
//!
//! ## Cache
//! - [`CacheEngine`] - two-tier (L1 in-process, L2 persistent) cache
//! - [`CacheNamespace`], [`PolicyRegistry`] - per-namespace policy
//! - [`CacheStore`], [`RedisStore`] - the persistent-tier boundary
//!
//! ## Retrieval
//! - [`FusionEngine`], [`HybridWeights`], [`FusedHit`] - dense/sparse
//!   score fusion with keyword fallback
//! - [`Reranker`], [`select_model`] - semantic rerank with heuristic
//!   fallback
//! - [`EmbeddingProvider`], [`HttpEmbedder`] - embedding boundary
//! - [`VectorIndexClient`], [`QdrantIndex`] - vector-index boundary
//!
//! ## Test/Mock Support
//! Mock implementations are available behind
//! `#[cfg(any(test, feature = "mock"))]`.

pub mod cache;
pub mod config;
pub mod embedding;
pub mod fusion;
pub mod hashing;
pub mod orchestrator;
pub mod rerank;
pub mod vectordb;

pub use cache::{
    CacheEngine, CacheFault, CacheNamespace, CacheStore, NamespacePolicy, PolicyRegistry,
    RedisStore, StoreError, default_policies,
};
#[cfg(any(test, feature = "mock"))]
pub use cache::MockCacheStore;

pub use config::{Config, ConfigError};
pub use embedding::{EmbedderConfig, EmbeddingError, EmbeddingProvider, HttpEmbedder};
#[cfg(any(test, feature = "mock"))]
pub use embedding::MockEmbedder;
pub use fusion::{
    FusedHit, FusionConfig, FusionEngine, FusionOutcome, HybridWeights, Source, SparseMode,
    select_weights,
};
pub use hashing::{hash_agent_id, hash_query_key, hash_tenant_id, hash_to_hex, hash_to_u64};
pub use orchestrator::{
    DegradedStage, OrchestratorConfig, PassageInput, RetrievalError, RetrievalOrchestrator,
    SearchOptions, SearchResponse, normalize_query,
};
pub use rerank::{RerankModel, RerankOptions, RerankOutcome, Reranker, select_model};
pub use vectordb::{
    HitMetadata, IndexRecord, MetadataFilter, QdrantIndex, SearchHit, VectorIndexClient,
    VectorIndexError, index_namespace,
};
#[cfg(any(test, feature = "mock"))]
pub use vectordb::MockVectorIndex;
