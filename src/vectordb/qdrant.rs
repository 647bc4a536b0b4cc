//! Qdrant-backed vector index client.
//!
//! Each (tenant, agent) namespace maps to one collection. Collections
//! carry dense vectors only; sparse queries report
//! [`VectorIndexError::SparseUnsupported`] so callers take the keyword
//! fallback, which runs as a full-text payload scroll scored client-side.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, RetrievedPoint,
    ScoredPoint, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, point_id::PointIdOptions,
};
use tracing::{debug, instrument};

use super::VectorIndexClient;
use super::error::VectorIndexError;
use super::model::{HitMetadata, IndexRecord, MetadataFilter, SearchHit};

#[derive(Clone)]
pub struct QdrantIndex {
    client: Qdrant,
    url: String,
    dimension: u64,
}

impl QdrantIndex {
    /// Connects to the Qdrant endpoint at `url`.
    pub async fn connect(url: &str, dimension: usize) -> Result<Self, VectorIndexError> {
        let client =
            Qdrant::from_url(url)
                .build()
                .map_err(|e| VectorIndexError::ConnectionFailed {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;

        Ok(Self {
            client,
            url: url.to_string(),
            dimension: dimension as u64,
        })
    }

    /// Performs a basic health check request.
    pub async fn health_check(&self) -> Result<(), VectorIndexError> {
        self.client
            .health_check()
            .await
            .map_err(|e| VectorIndexError::ConnectionFailed {
                url: self.url.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn ensure_collection(&self, namespace: &str) -> Result<(), VectorIndexError> {
        let exists = self.client.collection_exists(namespace).await.map_err(|e| {
            VectorIndexError::QueryFailed {
                namespace: namespace.to_string(),
                message: e.to_string(),
            }
        })?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(namespace)
                        .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine))
                        .on_disk_payload(true),
                )
                .await
                .map_err(|e| VectorIndexError::UpsertFailed {
                    namespace: namespace.to_string(),
                    message: e.to_string(),
                })?;
        }

        Ok(())
    }

    fn document_filter(filter: Option<&MetadataFilter>) -> Option<Filter> {
        match filter {
            Some(f) if !f.is_empty() => Some(Filter::must([Condition::matches(
                "document_id",
                f.document_ids.clone(),
            )])),
            _ => None,
        }
    }

    fn hit_from_scored(point: ScoredPoint) -> Option<SearchHit> {
        let id = point_id_string(point.id.and_then(|pid| pid.point_id_options))?;
        let (text, metadata) = payload_fields(&point.payload);
        Some(SearchHit {
            id,
            text,
            score: point.score,
            metadata,
        })
    }

    fn hit_from_retrieved(point: RetrievedPoint, score: f32) -> Option<SearchHit> {
        let id = point_id_string(point.id.and_then(|pid| pid.point_id_options))?;
        let (text, metadata) = payload_fields(&point.payload);
        Some(SearchHit {
            id,
            text,
            score,
            metadata,
        })
    }
}

fn point_id_string(options: Option<PointIdOptions>) -> Option<String> {
    match options {
        Some(PointIdOptions::Uuid(s)) => Some(s),
        Some(PointIdOptions::Num(n)) => Some(n.to_string()),
        None => None,
    }
}

fn payload_fields(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
) -> (String, HitMetadata) {
    let text = payload
        .get("text")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_default();

    let metadata = payload
        .get("metadata")
        .and_then(|v| v.as_str())
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    (text, metadata)
}

/// Fraction of query terms present in the passage (case-insensitive).
fn keyword_score(terms: &[String], text: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let matched = terms
        .iter()
        .filter(|t| lower.contains(&t.to_lowercase()))
        .count();
    matched as f32 / terms.len() as f32
}

#[async_trait::async_trait]
impl VectorIndexClient for QdrantIndex {
    #[instrument(skip(self, vector), fields(namespace = namespace, top_k = top_k))]
    async fn dense_query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: u64,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<SearchHit>, VectorIndexError> {
        if vector.len() as u64 != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension as usize,
                actual: vector.len(),
            });
        }

        let mut builder = SearchPointsBuilder::new(namespace, vector, top_k).with_payload(true);
        if let Some(f) = Self::document_filter(filter.as_ref()) {
            builder = builder.filter(f);
        }

        let response = self.client.search_points(builder).await.map_err(|e| {
            VectorIndexError::QueryFailed {
                namespace: namespace.to_string(),
                message: e.to_string(),
            }
        })?;

        debug!(hits = response.result.len(), "dense query complete");
        Ok(response
            .result
            .into_iter()
            .filter_map(Self::hit_from_scored)
            .collect())
    }

    async fn sparse_query(
        &self,
        namespace: &str,
        _query: &str,
        _top_k: u64,
        _filter: Option<MetadataFilter>,
    ) -> Result<Vec<SearchHit>, VectorIndexError> {
        // Collections are dense-only; no server-side sparse embedding is
        // configured. Callers fall back to keyword_query.
        Err(VectorIndexError::SparseUnsupported {
            namespace: namespace.to_string(),
        })
    }

    #[instrument(skip(self, terms), fields(namespace = namespace, terms = terms.len()))]
    async fn keyword_query(
        &self,
        namespace: &str,
        terms: &[String],
        top_k: u64,
    ) -> Result<Vec<SearchHit>, VectorIndexError> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let conditions: Vec<Condition> = terms
            .iter()
            .map(|t| Condition::matches_text("text", t.as_str()))
            .collect();

        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(namespace)
                    .filter(Filter::should(conditions))
                    .limit(top_k as u32)
                    .with_payload(true),
            )
            .await
            .map_err(|e| VectorIndexError::QueryFailed {
                namespace: namespace.to_string(),
                message: e.to_string(),
            })?;

        let mut hits: Vec<SearchHit> = response
            .result
            .into_iter()
            .filter_map(|point| {
                let text = point
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                let score = keyword_score(terms, &text);
                Self::hit_from_retrieved(point, score)
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k as usize);
        Ok(hits)
    }

    #[instrument(skip(self, records), fields(namespace = namespace, records = records.len()))]
    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<IndexRecord>,
    ) -> Result<(), VectorIndexError> {
        if records.is_empty() {
            return Ok(());
        }

        self.ensure_collection(namespace).await?;

        let mut points = Vec::with_capacity(records.len());
        for record in records {
            if record.vector.len() as u64 != self.dimension {
                return Err(VectorIndexError::InvalidDimension {
                    expected: self.dimension as usize,
                    actual: record.vector.len(),
                });
            }

            let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
            payload.insert("text".to_string(), record.text.into());
            if let HitMetadata::Document {
                ref document_id, ..
            } = record.metadata
            {
                payload.insert("document_id".to_string(), document_id.clone().into());
            }
            let metadata_json = serde_json::to_string(&record.metadata).map_err(|e| {
                VectorIndexError::UpsertFailed {
                    namespace: namespace.to_string(),
                    message: e.to_string(),
                }
            })?;
            payload.insert("metadata".to_string(), metadata_json.into());

            points.push(PointStruct::new(record.id, record.vector, payload));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(namespace, points).wait(true))
            .await
            .map_err(|e| VectorIndexError::UpsertFailed {
                namespace: namespace.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), VectorIndexError> {
        self.client
            .delete_collection(namespace)
            .await
            .map_err(|e| VectorIndexError::DeleteFailed {
                namespace: namespace.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("url", &self.url)
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_score_fractional() {
        let terms = vec!["rust".to_string(), "cache".to_string()];
        assert_eq!(keyword_score(&terms, "Rust is fast"), 0.5);
        assert_eq!(keyword_score(&terms, "rust cache engine"), 1.0);
        assert_eq!(keyword_score(&terms, "nothing relevant"), 0.0);
    }

    #[test]
    fn test_keyword_score_case_insensitive() {
        let terms = vec!["Widget".to_string()];
        assert_eq!(keyword_score(&terms, "the widget spins"), 1.0);
    }

    #[test]
    fn test_point_id_string_variants() {
        assert_eq!(
            point_id_string(Some(PointIdOptions::Uuid("abc".into()))),
            Some("abc".to_string())
        );
        assert_eq!(
            point_id_string(Some(PointIdOptions::Num(7))),
            Some("7".to_string())
        );
        assert_eq!(point_id_string(None), None);
    }
}
