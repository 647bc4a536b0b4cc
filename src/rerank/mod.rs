//! Second-pass relevance scoring.
//!
//! The primary path scores (query, passage) pairs semantically through
//! the embedding provider. When the provider is down, or any single pair
//! fails, that pair falls back to a lexical term-overlap heuristic; the
//! rest of the batch proceeds. A rerank pass can lower a request's
//! quality, never fail it.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::embedding::EmbeddingProvider;
use crate::vectordb::{SearchHit, cosine_similarity};

/// Share of the rerank score taken by the fresh relevance signal; the
/// remainder keeps the original retrieval score.
const NEW_SCORE_WEIGHT: f32 = 0.7;
const ORIGINAL_SCORE_WEIGHT: f32 = 0.3;

/// Query length (chars) above which the accurate model is worth it.
const ACCURATE_MODEL_MIN_CHARS: usize = 64;
/// Query word count above which the accurate model is worth it.
const ACCURATE_MODEL_MIN_WORDS: usize = 10;

/// Relevance model tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankModel {
    /// Cheaper, lower-latency model for short lookups.
    Fast,
    /// Higher-quality model for long or complex queries.
    Accurate,
}

/// Picks a model tier from query length and complexity alone.
///
/// Pure function so callers can choose a model without constructing a
/// reranker.
pub fn select_model(query: &str) -> RerankModel {
    let words = query.split_whitespace().count();
    if query.chars().count() >= ACCURATE_MODEL_MIN_CHARS || words >= ACCURATE_MODEL_MIN_WORDS {
        RerankModel::Accurate
    } else {
        RerankModel::Fast
    }
}

/// Per-call rerank options.
#[derive(Debug, Clone)]
pub struct RerankOptions {
    /// Max hits returned after reranking.
    pub top_n: usize,
    /// Hits scoring below this are dropped.
    pub score_threshold: f32,
    /// Model tier; `None` lets [`select_model`] decide.
    pub model: Option<RerankModel>,
}

impl Default for RerankOptions {
    fn default() -> Self {
        Self {
            top_n: 10,
            score_threshold: 0.1,
            model: None,
        }
    }
}

/// Rerank output plus whether any pair took the heuristic fallback.
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub hits: Vec<SearchHit>,
    /// True when the semantic model was unavailable for at least part of
    /// the batch and heuristic scores filled in.
    pub used_fallback: bool,
}

impl RerankOutcome {
    fn passthrough(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            used_fallback: false,
        }
    }
}

pub struct Reranker {
    embedder: Arc<dyn EmbeddingProvider>,
    enabled: bool,
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl Reranker {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, enabled: bool) -> Self {
        Self { embedder, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Rescores and reorders hits.
    ///
    /// A no-op passthrough when reranking is disabled or fewer than two
    /// hits were supplied (nothing to reorder).
    #[instrument(skip(self, hits), fields(hits = hits.len()))]
    pub async fn rerank(
        &self,
        query: &str,
        hits: Vec<SearchHit>,
        opts: &RerankOptions,
    ) -> RerankOutcome {
        if !self.enabled || hits.len() < 2 {
            return RerankOutcome::passthrough(hits);
        }

        let model = opts.model.unwrap_or_else(|| select_model(query));
        debug!(?model, "reranking");

        let (scored, used_fallback) = match self.embedder.embed(query).await {
            Ok(query_vector) => self.semantic_pass(query, &query_vector, hits).await,
            Err(e) => {
                warn!(error = %e, "query embedding failed, heuristic rerank for whole batch");
                let scored = hits
                    .into_iter()
                    .map(|hit| {
                        let score = blend(heuristic_score(query, &hit.text), hit.score);
                        SearchHit { score, ..hit }
                    })
                    .collect();
                (scored, true)
            }
        };

        RerankOutcome {
            hits: finalize(scored, opts),
            used_fallback,
        }
    }

    /// Scores each pair semantically, falling back per pair on failure.
    async fn semantic_pass(
        &self,
        query: &str,
        query_vector: &[f32],
        hits: Vec<SearchHit>,
    ) -> (Vec<SearchHit>, bool) {
        let texts: Vec<String> = hits.iter().map(|h| h.text.clone()).collect();

        match self.embedder.embed_batch(&texts).await {
            Ok(vectors) => {
                let scored = hits
                    .into_iter()
                    .zip(vectors)
                    .map(|(hit, vector)| {
                        let semantic = cosine_similarity(query_vector, &vector);
                        let score = blend(semantic, hit.score);
                        SearchHit { score, ..hit }
                    })
                    .collect();
                (scored, false)
            }
            Err(e) => {
                // The batch call refused entirely; retry pair by pair so
                // one bad passage cannot sink the rest.
                warn!(error = %e, "batch embedding failed, scoring pairs individually");
                let mut scored = Vec::with_capacity(hits.len());
                let mut used_fallback = false;
                for hit in hits {
                    let semantic = match self.embedder.embed(&hit.text).await {
                        Ok(vector) => cosine_similarity(query_vector, &vector),
                        Err(e) => {
                            warn!(id = %hit.id, error = %e, "pair scoring failed, using heuristic");
                            used_fallback = true;
                            heuristic_score(query, &hit.text)
                        }
                    };
                    let score = blend(semantic, hit.score);
                    scored.push(SearchHit { score, ..hit });
                }
                (scored, used_fallback)
            }
        }
    }
}

fn blend(new_score: f32, original_score: f32) -> f32 {
    NEW_SCORE_WEIGHT * new_score + ORIGINAL_SCORE_WEIGHT * original_score
}

fn finalize(mut hits: Vec<SearchHit>, opts: &RerankOptions) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.retain(|h| h.score >= opts.score_threshold);
    hits.truncate(opts.top_n);
    hits
}

/// Lexical relevance heuristic: fraction of query terms present in the
/// passage, with a small bonus for passages of comparable length (very
/// short or very long passages dilute relevance).
pub fn heuristic_score(query: &str, passage: &str) -> f32 {
    let query_terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if query_terms.is_empty() || passage.is_empty() {
        return 0.0;
    }

    let passage_lower = passage.to_lowercase();
    let matched = query_terms
        .iter()
        .filter(|t| passage_lower.contains(*t))
        .count();
    let overlap = matched as f32 / query_terms.len() as f32;

    let ratio = query.len() as f32 / passage.len() as f32;
    let length_bonus = 0.2 * ratio.min(1.0 / ratio).clamp(0.0, 1.0);

    (0.8 * overlap + length_bonus).clamp(0.0, 1.0)
}
