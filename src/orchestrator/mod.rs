//! Retrieval orchestrator.
//!
//! Composes one request/response cycle over the whole pipeline:
//! preprocess, cached-result lookup, dense search, fusion, optional
//! rerank, cache store. Only two failures ever reach the caller: a
//! missing namespace policy at startup and a dense-search outage.
//! Everything else degrades to the best available prior-stage result
//! and is tagged on the response.

pub mod error;

pub use error::RetrievalError;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheEngine, CacheNamespace};
use crate::config::Config;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::fusion::{FusedHit, FusionConfig, FusionEngine, HybridWeights, SparseMode, select_weights};
use crate::hashing::{hash_query_key, hash_to_hex};
use crate::rerank::{RerankOptions, Reranker};
use crate::vectordb::{HitMetadata, IndexRecord, MetadataFilter, SearchHit, VectorIndexClient, index_namespace};

/// Which stage fell back to a lower-confidence path.
///
/// A tag, not an error: the response still carries the best ranking the
/// pipeline could produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedStage {
    /// Query embedding failed, so the dense stage was skipped entirely.
    DenseSkipped,
    /// The lexical stage ran on keyword fallback instead of sparse.
    LexicalFallback,
    /// The reranker scored with the term-overlap heuristic.
    Rerank,
}

/// Per-request knobs. `Default` leaves every decision to the
/// orchestrator's configuration.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Result count cap; `None` uses the configured default.
    pub top_k: Option<usize>,
    /// Fusion weights; `None` picks them from the query surface.
    pub weights: Option<HybridWeights>,
    /// Rerank override; `None` follows the configured setting.
    pub rerank: Option<bool>,
    /// Metadata filter applied to every dense query in the request.
    pub filter: Option<MetadataFilter>,
    /// Reformulated queries searched in parallel and merged in.
    pub expansions: Vec<String>,
    /// Skip the cached-result lookup (the store still happens).
    pub bypass_cache: bool,
}

/// The outcome of one retrieval cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<FusedHit>,
    /// Set when some stage fell back; `None` means full-confidence.
    pub degraded: Option<DegradedStage>,
    pub from_cache: bool,
}

impl SearchResponse {
    fn empty() -> Self {
        Self {
            hits: Vec::new(),
            degraded: None,
            from_cache: false,
        }
    }
}

/// A passage handed to [`RetrievalOrchestrator::upsert_passages`].
#[derive(Debug, Clone)]
pub struct PassageInput {
    /// Stable passage id; `None` assigns a fresh UUID.
    pub id: Option<String>,
    pub text: String,
    pub metadata: HitMetadata,
}

/// Orchestrator tuning, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_top_k: usize,
    /// Top-K requested from each dense query, before fusion truncates.
    pub dense_top_k: u64,
    pub default_weights: HybridWeights,
    pub rerank_enabled: bool,
    pub rerank_threshold: f32,
    /// Deadline for each external call made by the orchestrator.
    pub call_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            dense_top_k: 20,
            default_weights: HybridWeights::new(0.7, 0.3),
            rerank_enabled: true,
            rerank_threshold: 0.1,
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_weights: config.default_weights,
            rerank_enabled: config.rerank_enabled,
            rerank_threshold: config.rerank_threshold,
            call_timeout: config.call_timeout,
            ..Self::default()
        }
    }
}

/// Top-level request pipeline.
///
/// Consumers call [`search`](Self::search) for retrieval and
/// [`invalidate`](Self::invalidate) / [`upsert_passages`](Self::upsert_passages) /
/// [`drop_agent_index`](Self::drop_agent_index) after document changes;
/// no other internal interface is exposed.
pub struct RetrievalOrchestrator {
    cache: Arc<CacheEngine>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndexClient>,
    fusion: FusionEngine,
    reranker: Reranker,
    settings: OrchestratorConfig,
}

impl std::fmt::Debug for RetrievalOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalOrchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RetrievalOrchestrator {
    pub fn new(
        settings: OrchestratorConfig,
        cache: Arc<CacheEngine>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndexClient>,
    ) -> Self {
        let fusion = FusionEngine::new(
            Arc::clone(&index),
            Arc::clone(&cache),
            FusionConfig {
                default_weights: settings.default_weights,
                sparse_top_k: settings.dense_top_k,
                call_timeout: settings.call_timeout,
            },
        );
        let reranker = Reranker::new(Arc::clone(&embedder), settings.rerank_enabled);

        Self {
            cache,
            embedder,
            index,
            fusion,
            reranker,
            settings,
        }
    }

    /// Runs one retrieval cycle for a query scoped to (tenant, agent).
    ///
    /// Errors only when the dense query itself fails against the index.
    /// An embedding outage skips the dense stage instead, and fusion or
    /// rerank trouble degrades to the prior stage's result, tagged via
    /// [`SearchResponse::degraded`].
    #[instrument(skip(self, options), fields(tenant = tenant_id, agent = agent_id))]
    pub async fn search(
        &self,
        query: &str,
        tenant_id: &str,
        agent_id: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, RetrievalError> {
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Ok(SearchResponse::empty());
        }

        let top_k = options.top_k.unwrap_or(self.settings.default_top_k);
        // Weight selection reads the raw query: capitalization is one of
        // its signals and normalization lowercases it away.
        let weights = options
            .weights
            .unwrap_or_else(|| select_weights(query, self.settings.default_weights));

        let cache_key = hash_to_hex(&hash_query_key(&normalized, tenant_id, agent_id, &weights));
        let scope = scope_key(tenant_id, agent_id);

        if !options.bypass_cache {
            if let Some(hits) = self
                .cache
                .get::<Vec<FusedHit>>(CacheNamespace::HybridResults, &cache_key)
                .await
            {
                debug!("serving cached hybrid result");
                return Ok(SearchResponse {
                    hits,
                    degraded: None,
                    from_cache: true,
                });
            }
        }

        let namespace = index_namespace(tenant_id, agent_id);
        let mut degraded: Option<DegradedStage> = None;

        let mut dense_hits = match self.embed_cached(&normalized).await {
            Ok(vector) => self.primary_dense(&namespace, vector, options).await?,
            Err(e) => {
                warn!(error = %e, "query embedding failed, skipping dense stage");
                degraded = Some(DegradedStage::DenseSkipped);
                Vec::new()
            }
        };

        if !options.expansions.is_empty() {
            let extra = self
                .expansion_fan_out(&namespace, &options.expansions, options.filter.as_ref())
                .await;
            dense_hits = merge_dense(dense_hits, extra);
        }

        let outcome = self
            .fusion
            .fuse(&normalized, dense_hits, &namespace, Some(weights), top_k)
            .await;
        if degraded.is_none() && outcome.sparse_mode == SparseMode::KeywordFallback {
            degraded = Some(DegradedStage::LexicalFallback);
        }

        let hits = self
            .rerank_stage(&normalized, outcome.hits, options, top_k, &mut degraded)
            .await;

        // Degraded rankings stay out of the cache so a transient outage
        // does not serve lower-confidence results for a full TTL.
        if degraded.is_none() {
            self.cache
                .set_scoped(
                    CacheNamespace::HybridResults,
                    &cache_key,
                    hits.clone(),
                    None,
                    &scope,
                )
                .await;
        }

        info!(
            hits = hits.len(),
            ?degraded,
            "retrieval cycle complete"
        );
        Ok(SearchResponse {
            hits,
            degraded,
            from_cache: false,
        })
    }

    /// Embeds a normalized query, consulting the embedding cache first.
    async fn embed_cached(&self, normalized: &str) -> Result<Vec<f32>, EmbeddingError> {
        let key = hash_to_hex(blake3::hash(normalized.as_bytes()).as_bytes());

        if let Some(vector) = self
            .cache
            .get::<Vec<f32>>(CacheNamespace::Embedding, &key)
            .await
        {
            debug!("query embedding served from cache");
            return Ok(vector);
        }

        let vector = match timeout(self.settings.call_timeout, self.embedder.embed(normalized))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(EmbeddingError::Timeout {
                    timeout_ms: self.settings.call_timeout.as_millis() as u64,
                });
            }
        };

        self.cache
            .set(CacheNamespace::Embedding, &key, vector.clone(), None)
            .await;
        Ok(vector)
    }

    /// Dense query for the primary query vector. The one fatal stage.
    async fn primary_dense(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        let query = self.index.dense_query(
            namespace,
            vector,
            self.settings.dense_top_k,
            options.filter.clone(),
        );

        match timeout(self.settings.call_timeout, query).await {
            Ok(Ok(hits)) => {
                debug!(hits = hits.len(), "dense stage complete");
                Ok(hits)
            }
            Ok(Err(e)) => Err(RetrievalError::upstream("dense_search", e.to_string())),
            Err(_) => Err(RetrievalError::upstream("dense_search", "query timed out")),
        }
    }

    /// Searches reformulated queries in parallel.
    ///
    /// Each expansion carries its own deadline; a failed or expired
    /// expansion contributes nothing and is never fatal.
    async fn expansion_fan_out(
        &self,
        namespace: &str,
        expansions: &[String],
        filter: Option<&MetadataFilter>,
    ) -> Vec<SearchHit> {
        let searches = expansions.iter().map(|expansion| {
            let normalized = normalize_query(expansion);
            let filter = filter.cloned();
            async move {
                if normalized.is_empty() {
                    return Vec::new();
                }

                let vector = match self.embed_cached(&normalized).await {
                    Ok(vector) => vector,
                    Err(e) => {
                        warn!(error = %e, expansion = %normalized, "expansion embed failed, dropping");
                        return Vec::new();
                    }
                };

                let query = self.index.dense_query(
                    namespace,
                    vector,
                    self.settings.dense_top_k,
                    filter,
                );
                match timeout(self.settings.call_timeout, query).await {
                    Ok(Ok(hits)) => hits,
                    Ok(Err(e)) => {
                        warn!(error = %e, expansion = %normalized, "expansion query failed, dropping");
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(expansion = %normalized, "expansion query timed out, dropping");
                        Vec::new()
                    }
                }
            }
        });

        let results = join_all(searches).await;
        results.into_iter().flatten().collect()
    }

    /// Optional rerank over the fused list, preserving provenance.
    async fn rerank_stage(
        &self,
        query: &str,
        fused: Vec<FusedHit>,
        options: &SearchOptions,
        top_k: usize,
        degraded: &mut Option<DegradedStage>,
    ) -> Vec<FusedHit> {
        let enabled = options.rerank.unwrap_or(self.reranker.is_enabled());
        if !enabled || fused.len() < 2 {
            return fused;
        }

        let mut sources: HashMap<String, Vec<crate::fusion::Source>> = fused
            .iter()
            .map(|f| (f.hit.id.clone(), f.sources.clone()))
            .collect();
        let hits: Vec<SearchHit> = fused.into_iter().map(|f| f.hit).collect();

        let opts = RerankOptions {
            top_n: top_k,
            score_threshold: self.settings.rerank_threshold,
            model: None,
        };
        let outcome = self.reranker.rerank(query, hits, &opts).await;
        if outcome.used_fallback && degraded.is_none() {
            *degraded = Some(DegradedStage::Rerank);
        }

        outcome
            .hits
            .into_iter()
            .map(|hit| {
                let sources = sources.remove(&hit.id).unwrap_or_default();
                FusedHit { hit, sources }
            })
            .collect()
    }

    /// Purges every cached result produced for this (tenant, agent)
    /// scope. Called after re-indexing or document changes.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, tenant_id: &str, agent_id: &str) {
        self.cache.invalidate_scope(&scope_key(tenant_id, agent_id)).await;
    }

    /// Embeds and indexes passages into the agent's namespace, then
    /// invalidates cached results for the scope.
    ///
    /// Returns the ids the passages were stored under.
    #[instrument(skip(self, passages), fields(tenant = tenant_id, agent = agent_id, count = passages.len()))]
    pub async fn upsert_passages(
        &self,
        tenant_id: &str,
        agent_id: &str,
        passages: Vec<PassageInput>,
    ) -> Result<Vec<String>, RetrievalError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| RetrievalError::upstream("embedding", e.to_string()))?;

        let records: Vec<IndexRecord> = passages
            .into_iter()
            .zip(vectors)
            .map(|(passage, vector)| IndexRecord {
                id: passage
                    .id
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                text: passage.text,
                vector,
                metadata: passage.metadata,
            })
            .collect();
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        let namespace = index_namespace(tenant_id, agent_id);
        self.index
            .upsert(&namespace, records)
            .await
            .map_err(|e| RetrievalError::upstream("index_upsert", e.to_string()))?;

        info!(indexed = ids.len(), "passages indexed, invalidating scope");
        self.invalidate(tenant_id, agent_id).await;
        Ok(ids)
    }

    /// Drops the agent's entire index namespace and purges its cached
    /// results.
    #[instrument(skip(self))]
    pub async fn drop_agent_index(
        &self,
        tenant_id: &str,
        agent_id: &str,
    ) -> Result<(), RetrievalError> {
        let namespace = index_namespace(tenant_id, agent_id);
        self.index
            .delete_namespace(&namespace)
            .await
            .map_err(|e| RetrievalError::upstream("index_delete", e.to_string()))?;

        self.invalidate(tenant_id, agent_id).await;
        Ok(())
    }
}

fn scope_key(tenant_id: &str, agent_id: &str) -> String {
    format!("{tenant_id}:{agent_id}")
}

/// Collapses whitespace and lowercases, so trivially different phrasings
/// of one query share a cache key.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Request-scoped dedupe of dense hits from the primary query and its
/// expansions: one entry per id, best score wins.
fn merge_dense(primary: Vec<SearchHit>, extra: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut by_id: HashMap<String, SearchHit> = HashMap::new();
    for hit in primary.into_iter().chain(extra) {
        match by_id.get_mut(&hit.id) {
            Some(existing) => {
                if hit.score > existing.score {
                    *existing = hit;
                }
            }
            None => {
                by_id.insert(hit.id.clone(), hit);
            }
        }
    }

    let mut merged: Vec<SearchHit> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}

#[cfg(test)]
mod tests;
