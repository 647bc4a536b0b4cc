use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use super::VectorIndexClient;
use super::error::VectorIndexError;
use super::model::{HitMetadata, IndexRecord, MetadataFilter, SearchHit, cosine_similarity};

/// In-memory vector index for tests.
///
/// Dense queries score by cosine similarity; sparse queries score by
/// term overlap. Sparse support and dense availability can be toggled to
/// exercise fallback paths.
#[derive(Default)]
pub struct MockVectorIndex {
    namespaces: RwLock<HashMap<String, Vec<IndexRecord>>>,
    sparse_supported: AtomicBool,
    dense_failing: AtomicBool,
    sparse_failing: AtomicBool,
    dense_query_count: AtomicU64,
    sparse_query_count: AtomicU64,
    keyword_query_count: AtomicU64,
}

impl MockVectorIndex {
    pub fn new() -> Self {
        Self {
            sparse_supported: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn set_sparse_supported(&self, supported: bool) {
        self.sparse_supported.store(supported, Ordering::Relaxed);
    }

    pub fn set_dense_failing(&self, failing: bool) {
        self.dense_failing.store(failing, Ordering::Relaxed);
    }

    pub fn set_sparse_failing(&self, failing: bool) {
        self.sparse_failing.store(failing, Ordering::Relaxed);
    }

    pub fn dense_query_count(&self) -> u64 {
        self.dense_query_count.load(Ordering::Relaxed)
    }

    pub fn sparse_query_count(&self) -> u64 {
        self.sparse_query_count.load(Ordering::Relaxed)
    }

    pub fn keyword_query_count(&self) -> u64 {
        self.keyword_query_count.load(Ordering::Relaxed)
    }

    pub fn record_count(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .get(namespace)
            .map_or(0, |records| records.len())
    }

    fn matches_filter(record: &IndexRecord, filter: Option<&MetadataFilter>) -> bool {
        let Some(filter) = filter else { return true };
        if filter.is_empty() {
            return true;
        }
        match &record.metadata {
            HitMetadata::Document { document_id, .. } => {
                filter.document_ids.contains(document_id)
            }
            _ => false,
        }
    }
}

fn term_overlap(query: &str, text: &str) -> f32 {
    let query_terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect();
    if query_terms.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let matched = query_terms.iter().filter(|t| lower.contains(*t)).count();
    matched as f32 / query_terms.len() as f32
}

fn sort_and_truncate(mut hits: Vec<SearchHit>, top_k: u64) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(top_k as usize);
    hits
}

#[async_trait::async_trait]
impl VectorIndexClient for MockVectorIndex {
    async fn dense_query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: u64,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<SearchHit>, VectorIndexError> {
        self.dense_query_count.fetch_add(1, Ordering::Relaxed);
        if self.dense_failing.load(Ordering::Relaxed) {
            return Err(VectorIndexError::QueryFailed {
                namespace: namespace.to_string(),
                message: "mock dense query failing".to_string(),
            });
        }

        let namespaces = self.namespaces.read();
        let records = namespaces.get(namespace).cloned().unwrap_or_default();

        let hits = records
            .iter()
            .filter(|r| Self::matches_filter(r, filter.as_ref()))
            .map(|r| {
                SearchHit::new(r.id.clone(), r.text.clone(), cosine_similarity(&vector, &r.vector))
                    .with_metadata(r.metadata.clone())
            })
            .collect();

        Ok(sort_and_truncate(hits, top_k))
    }

    async fn sparse_query(
        &self,
        namespace: &str,
        query: &str,
        top_k: u64,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<SearchHit>, VectorIndexError> {
        self.sparse_query_count.fetch_add(1, Ordering::Relaxed);
        if !self.sparse_supported.load(Ordering::Relaxed) {
            return Err(VectorIndexError::SparseUnsupported {
                namespace: namespace.to_string(),
            });
        }
        if self.sparse_failing.load(Ordering::Relaxed) {
            return Err(VectorIndexError::QueryFailed {
                namespace: namespace.to_string(),
                message: "mock sparse query failing".to_string(),
            });
        }

        let namespaces = self.namespaces.read();
        let records = namespaces.get(namespace).cloned().unwrap_or_default();

        let hits = records
            .iter()
            .filter(|r| Self::matches_filter(r, filter.as_ref()))
            .map(|r| {
                SearchHit::new(r.id.clone(), r.text.clone(), term_overlap(query, &r.text))
                    .with_metadata(r.metadata.clone())
            })
            .filter(|h| h.score > 0.0)
            .collect();

        Ok(sort_and_truncate(hits, top_k))
    }

    async fn keyword_query(
        &self,
        namespace: &str,
        terms: &[String],
        top_k: u64,
    ) -> Result<Vec<SearchHit>, VectorIndexError> {
        self.keyword_query_count.fetch_add(1, Ordering::Relaxed);
        let query = terms.join(" ");

        let namespaces = self.namespaces.read();
        let records = namespaces.get(namespace).cloned().unwrap_or_default();

        let hits = records
            .iter()
            .map(|r| {
                SearchHit::new(r.id.clone(), r.text.clone(), term_overlap(&query, &r.text))
                    .with_metadata(r.metadata.clone())
            })
            .filter(|h| h.score > 0.0)
            .collect();

        Ok(sort_and_truncate(hits, top_k))
    }

    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<IndexRecord>,
    ) -> Result<(), VectorIndexError> {
        let mut namespaces = self.namespaces.write();
        let existing = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            existing.retain(|r| r.id != record.id);
            existing.push(record);
        }
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), VectorIndexError> {
        self.namespaces.write().remove(namespace);
        Ok(())
    }
}
