//! Hybrid fusion engine.
//!
//! Combines dense (semantic) hits, computed by the caller, with a sparse
//! or keyword-fallback lexical pass, merging by passage id under weighted
//! score fusion. The engine never fails a request: every lexical-stage
//! problem degrades to a weaker signal, and degenerate inputs fall back
//! to the dense results rather than an empty set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::cache::{CacheEngine, CacheNamespace};
use crate::vectordb::{SearchHit, VectorIndexClient, VectorIndexError};

/// Score multiplier applied to keyword-fallback hits to mark them as
/// lower-confidence than true sparse hits.
pub const KEYWORD_FALLBACK_PENALTY: f32 = 0.75;

/// Score multiplier applied when fusion degrades to returning dense hits
/// verbatim.
pub const DENSE_FALLBACK_PENALTY: f32 = 0.9;

/// Max non-stopword terms extracted for the keyword fallback.
pub const MAX_FALLBACK_TERMS: usize = 3;

/// Relative weights for dense and sparse scores.
///
/// Each in [0, 1]; not required to sum to 1 (degenerate handling forces
/// 1.0/0.0 when the sparse stage is empty).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub dense: f32,
    pub sparse: f32,
}

impl HybridWeights {
    pub fn new(dense: f32, sparse: f32) -> Self {
        Self { dense, sparse }
    }

    /// Weights used when a query looks keyword-heavy.
    pub fn sparse_biased() -> Self {
        Self::new(0.6, 0.4)
    }

    /// Weights forced when the sparse stage is empty, so dense results
    /// are not discounted for a signal that never arrived.
    pub fn dense_only() -> Self {
        Self::new(1.0, 0.0)
    }
}

/// Which stage a fused score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Dense,
    Sparse,
}

/// A merged hit with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedHit {
    #[serde(flatten)]
    pub hit: SearchHit,
    pub sources: Vec<Source>,
}

/// How the lexical signal was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseMode {
    /// The index answered a true sparse query.
    Sparse,
    /// Sparse was unavailable; keyword fallback supplied the signal.
    KeywordFallback,
    /// No lexical signal at all; dense results carried the response.
    DenseOnly,
}

/// Fusion output plus how it was produced.
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    pub hits: Vec<FusedHit>,
    pub sparse_mode: SparseMode,
}

/// Fusion engine settings.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub default_weights: HybridWeights,
    /// Top-K requested from the lexical stage.
    pub sparse_top_k: u64,
    /// Deadline for each lexical-stage index call.
    pub call_timeout: Duration,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            default_weights: HybridWeights::new(0.7, 0.3),
            sparse_top_k: 20,
            call_timeout: Duration::from_secs(5),
        }
    }
}

pub struct FusionEngine {
    index: Arc<dyn VectorIndexClient>,
    cache: Arc<CacheEngine>,
    config: FusionConfig,
}

impl std::fmt::Debug for FusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FusionEngine {
    pub fn new(
        index: Arc<dyn VectorIndexClient>,
        cache: Arc<CacheEngine>,
        config: FusionConfig,
    ) -> Self {
        Self {
            index,
            cache,
            config,
        }
    }

    /// Fuses dense hits with the lexical signal for `namespace`.
    ///
    /// Dense hits arrive already computed so this engine stays decoupled
    /// from the embedding step. Never returns an error: lexical-stage
    /// failures degrade through keyword fallback down to dense-only.
    #[instrument(skip(self, dense_hits), fields(namespace = namespace, dense = dense_hits.len()))]
    pub async fn fuse(
        &self,
        query: &str,
        dense_hits: Vec<SearchHit>,
        namespace: &str,
        weights: Option<HybridWeights>,
        limit: usize,
    ) -> FusionOutcome {
        let weights = weights.unwrap_or_else(|| select_weights(query, self.config.default_weights));

        let (sparse_hits, sparse_mode) = self.lexical_stage(query, namespace).await;

        let hits = merge_hits(&dense_hits, &sparse_hits, weights, limit);
        debug!(
            fused = hits.len(),
            ?sparse_mode,
            "fusion complete"
        );

        FusionOutcome { hits, sparse_mode }
    }

    /// Runs the sparse query, degrading to keyword fallback and then to
    /// nothing. Capability probes are cached per namespace so an index
    /// that rejects sparse queries is not re-probed on every request.
    async fn lexical_stage(&self, query: &str, namespace: &str) -> (Vec<SearchHit>, SparseMode) {
        let sparse_known_unavailable = matches!(
            self.cache
                .get::<bool>(CacheNamespace::VectorAvailability, namespace)
                .await,
            Some(false)
        );

        if !sparse_known_unavailable {
            let sparse = tokio::time::timeout(
                self.config.call_timeout,
                self.index
                    .sparse_query(namespace, query, self.config.sparse_top_k, None),
            )
            .await;

            match sparse {
                Ok(Ok(hits)) => {
                    self.cache
                        .set(CacheNamespace::VectorAvailability, namespace, true, None)
                        .await;
                    return (hits, SparseMode::Sparse);
                }
                Ok(Err(VectorIndexError::SparseUnsupported { .. })) => {
                    debug!("sparse queries unsupported, caching and falling back");
                    self.cache
                        .set(CacheNamespace::VectorAvailability, namespace, false, None)
                        .await;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "sparse query failed, falling back to keywords");
                }
                Err(_) => {
                    warn!("sparse query timed out, falling back to keywords");
                }
            }
        }

        let terms = extract_terms(query, MAX_FALLBACK_TERMS);
        if terms.is_empty() {
            return (Vec::new(), SparseMode::DenseOnly);
        }

        let keyword = tokio::time::timeout(
            self.config.call_timeout,
            self.index
                .keyword_query(namespace, &terms, self.config.sparse_top_k),
        )
        .await;

        match keyword {
            Ok(Ok(mut hits)) if !hits.is_empty() => {
                for hit in &mut hits {
                    hit.score *= KEYWORD_FALLBACK_PENALTY;
                }
                (hits, SparseMode::KeywordFallback)
            }
            Ok(Ok(_)) => (Vec::new(), SparseMode::DenseOnly),
            Ok(Err(e)) => {
                warn!(error = %e, "keyword fallback failed, continuing dense-only");
                (Vec::new(), SparseMode::DenseOnly)
            }
            Err(_) => {
                warn!("keyword fallback timed out, continuing dense-only");
                (Vec::new(), SparseMode::DenseOnly)
            }
        }
    }
}

/// Weighted merge of dense and sparse hit lists, keyed by passage id.
///
/// Deterministic for fixed inputs: ties in fused score break by id.
pub fn merge_hits(
    dense: &[SearchHit],
    sparse: &[SearchHit],
    weights: HybridWeights,
    limit: usize,
) -> Vec<FusedHit> {
    // An empty sparse stage must not discount dense scores.
    let weights = if sparse.is_empty() {
        HybridWeights::dense_only()
    } else {
        weights
    };

    let mut merged: HashMap<String, FusedHit> = HashMap::new();

    for hit in dense {
        let mut fused = hit.clone();
        fused.score *= weights.dense;
        merged.insert(
            hit.id.clone(),
            FusedHit {
                hit: fused,
                sources: vec![Source::Dense],
            },
        );
    }

    for hit in sparse {
        match merged.get_mut(&hit.id) {
            Some(existing) => {
                // Combine, don't replace: both signals agreeing on a
                // passage should raise it.
                existing.hit.score += hit.score * weights.sparse;
                if existing.hit.text.is_empty() && !hit.text.is_empty() {
                    existing.hit.text = hit.text.clone();
                }
                existing.sources.push(Source::Sparse);
            }
            None => {
                let mut fused = hit.clone();
                fused.score *= weights.sparse;
                merged.insert(
                    hit.id.clone(),
                    FusedHit {
                        hit: fused,
                        sources: vec![Source::Sparse],
                    },
                );
            }
        }
    }

    let mut results: Vec<FusedHit> = merged.into_values().collect();

    // Degrade rather than go empty: if merging produced nothing but the
    // dense stage had found something, return it with a penalty.
    if results.is_empty() && !dense.is_empty() {
        results = dense
            .iter()
            .map(|hit| {
                let mut fused = hit.clone();
                fused.score *= DENSE_FALLBACK_PENALTY;
                FusedHit {
                    hit: fused,
                    sources: vec![Source::Dense],
                }
            })
            .collect();
    }

    results.sort_by(|a, b| {
        b.hit
            .score
            .partial_cmp(&a.hit.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.hit.id.cmp(&b.hit.id))
    });
    results.truncate(limit);
    results
}

/// Picks fusion weights from surface features of the query.
///
/// Interrogatives, numerals, and capitalized multi-word runs (proper
/// nouns) mark keyword-heavy queries that deserve a stronger sparse
/// signal; everything else keeps the configured dense-biased default.
pub fn select_weights(query: &str, default: HybridWeights) -> HybridWeights {
    if is_keyword_heavy(query) {
        HybridWeights::sparse_biased()
    } else {
        default
    }
}

const INTERROGATIVES: [&str; 9] = [
    "who", "what", "when", "where", "which", "whose", "whom", "how", "why",
];

fn is_keyword_heavy(query: &str) -> bool {
    if query.contains('?') {
        return true;
    }
    if query.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }

    let words: Vec<&str> = query.split_whitespace().collect();

    if let Some(first) = words.first() {
        let lowered = first.to_lowercase();
        if INTERROGATIVES.contains(&lowered.as_str()) {
            return true;
        }
    }

    // Two adjacent capitalized words read as a proper noun ("Acme
    // Handbook"). The query-initial word alone doesn't count.
    words.windows(2).skip(1).any(|pair| {
        pair.iter()
            .all(|w| w.chars().next().is_some_and(char::is_uppercase))
    })
}

const STOPWORDS: [&str; 32] = [
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "how", "in",
    "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "were", "what", "when",
    "where", "which", "who", "why", "with",
];

/// Extracts up to `max_terms` non-stopword terms for keyword fallback.
pub fn extract_terms(query: &str, max_terms: usize) -> Vec<String> {
    let mut seen = Vec::new();
    for word in query.split_whitespace() {
        let term: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if term.is_empty() || STOPWORDS.contains(&term.as_str()) || seen.contains(&term) {
            continue;
        }
        seen.push(term);
        if seen.len() == max_terms {
            break;
        }
    }
    seen
}
