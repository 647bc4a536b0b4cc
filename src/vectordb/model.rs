//! Search hit and record types shared across retrieval stages.

use serde::{Deserialize, Serialize};

use crate::hashing::{hash_agent_id, hash_tenant_id};

/// Fixed, documented metadata schema for a passage.
///
/// A tagged variant per source type, not an open map: fusion and rerank
/// code can match on the shape without defensive key probing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HitMetadata {
    /// A chunk of an uploaded document.
    Document {
        document_id: String,
        chunk_index: u32,
        title: Option<String>,
    },
    /// A curated question/answer pair.
    Faq { question: String },
    /// Source unknown (e.g. indexed before metadata was recorded).
    #[default]
    Unknown,
}

/// A single ranked passage.
///
/// `id` is the passage identity and stays stable across the dense,
/// sparse, and rerank stages; it is the fusion join key. `score` is
/// stage-relative and must be reinterpreted at each stage, never treated
/// as globally comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: HitMetadata,
}

impl SearchHit {
    pub fn new(id: impl Into<String>, text: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            score,
            metadata: HitMetadata::Unknown,
        }
    }

    pub fn with_metadata(mut self, metadata: HitMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A passage to be indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: HitMetadata,
}

/// Metadata filter applied to index queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    /// Restrict hits to these document ids (empty = no restriction).
    pub document_ids: Vec<String>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
    }
}

/// Cosine similarity between two vectors; 0.0 for mismatched or empty
/// inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Deterministic index namespace for a (tenant, agent) pair.
///
/// Hashes both identifiers so arbitrary tenant strings cannot produce
/// invalid or colliding collection names: two pairs map to the same
/// namespace only when tenant and agent are both identical.
pub fn index_namespace(tenant_id: &str, agent_id: &str) -> String {
    format!(
        "kb_{:016x}_{:016x}",
        hash_tenant_id(tenant_id),
        hash_agent_id(agent_id)
    )
}
