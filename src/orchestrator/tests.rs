use std::sync::Arc;

use super::*;
use crate::cache::{CacheEngine, CacheStore, MockCacheStore, PolicyRegistry};
use crate::embedding::MockEmbedder;
use crate::vectordb::{HitMetadata, MockVectorIndex};

const DIM: usize = 8;

struct Harness {
    orchestrator: RetrievalOrchestrator,
    embedder: Arc<MockEmbedder>,
    index: Arc<MockVectorIndex>,
    cache: Arc<CacheEngine>,
}

fn harness(rerank: bool) -> Harness {
    let store = Arc::new(MockCacheStore::new());
    let cache = Arc::new(CacheEngine::new(
        PolicyRegistry::with_defaults(),
        Arc::clone(&store) as Arc<dyn CacheStore>,
    ));
    let embedder = Arc::new(MockEmbedder::new(DIM));
    let index = Arc::new(MockVectorIndex::new());

    let settings = OrchestratorConfig {
        rerank_enabled: rerank,
        ..OrchestratorConfig::default()
    };
    let orchestrator = RetrievalOrchestrator::new(
        settings,
        Arc::clone(&cache),
        Arc::clone(&embedder) as Arc<dyn crate::embedding::EmbeddingProvider>,
        Arc::clone(&index) as Arc<dyn crate::vectordb::VectorIndexClient>,
    );

    Harness {
        orchestrator,
        embedder,
        index,
        cache,
    }
}

async fn seed(h: &Harness, tenant: &str, agent: &str) {
    let passages = vec![
        PassageInput {
            id: Some("ownership".to_string()),
            text: "ownership and borrowing rules".to_string(),
            metadata: HitMetadata::Unknown,
        },
        PassageInput {
            id: Some("caching".to_string()),
            text: "tiered caching with expiry".to_string(),
            metadata: HitMetadata::Unknown,
        },
        PassageInput {
            id: Some("teapot".to_string()),
            text: "short and stout".to_string(),
            metadata: HitMetadata::Unknown,
        },
    ];
    h.orchestrator
        .upsert_passages(tenant, agent, passages)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_exact_text_query_ranks_its_passage_first() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;

    let resp = h
        .orchestrator
        .search(
            "ownership and borrowing rules",
            "t1",
            "a1",
            &SearchOptions::default(),
        )
        .await
        .unwrap();

    assert!(!resp.from_cache);
    assert_eq!(resp.degraded, None);
    assert_eq!(resp.hits[0].hit.id, "ownership");
}

#[tokio::test]
async fn test_repeat_search_is_served_from_cache() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;
    let opts = SearchOptions::default();

    let first = h
        .orchestrator
        .search("tiered caching with expiry", "t1", "a1", &opts)
        .await
        .unwrap();
    assert!(!first.from_cache);
    let queries_after_first = h.index.dense_query_count();

    let second = h
        .orchestrator
        .search("tiered caching with expiry", "t1", "a1", &opts)
        .await
        .unwrap();
    assert!(second.from_cache);
    assert_eq!(h.index.dense_query_count(), queries_after_first);
    assert_eq!(
        first.hits.iter().map(|f| &f.hit.id).collect::<Vec<_>>(),
        second.hits.iter().map(|f| &f.hit.id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_whitespace_and_case_share_a_cache_entry() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;
    let opts = SearchOptions::default();

    h.orchestrator
        .search("tiered caching with expiry", "t1", "a1", &opts)
        .await
        .unwrap();
    let second = h
        .orchestrator
        .search("  Tiered   CACHING with expiry ", "t1", "a1", &opts)
        .await
        .unwrap();

    assert!(second.from_cache);
}

#[tokio::test]
async fn test_embedding_outage_degrades_instead_of_failing() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;
    h.embedder.set_failing(true);

    let resp = h
        .orchestrator
        .search(
            "tiered caching with expiry",
            "t1",
            "a1",
            &SearchOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(resp.degraded, Some(DegradedStage::DenseSkipped));
    // The sparse stage still found the passage lexically.
    assert!(resp.hits.iter().any(|f| f.hit.id == "caching"));
}

#[tokio::test]
async fn test_dense_outage_is_upstream_unavailable() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;
    h.index.set_dense_failing(true);

    let err = h
        .orchestrator
        .search(
            "tiered caching with expiry",
            "t1",
            "a1",
            &SearchOptions::default(),
        )
        .await
        .unwrap_err();

    match err {
        RetrievalError::UpstreamUnavailable { stage, .. } => assert_eq!(stage, "dense_search"),
        other => panic!("expected UpstreamUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_keyword_fallback_tags_degraded_and_skips_cache_store() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;
    h.index.set_sparse_supported(false);

    let resp = h
        .orchestrator
        .search(
            "tiered caching with expiry",
            "t1",
            "a1",
            &SearchOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(resp.degraded, Some(DegradedStage::LexicalFallback));
    // Lower-confidence rankings are not cached.
    assert_eq!(h.cache.scope_len("t1:a1"), 0);
}

#[tokio::test]
async fn test_invalidate_purges_cached_scope() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;
    let opts = SearchOptions::default();

    h.orchestrator
        .search("ownership and borrowing rules", "t1", "a1", &opts)
        .await
        .unwrap();
    assert_eq!(h.cache.scope_len("t1:a1"), 1);

    h.orchestrator.invalidate("t1", "a1").await;
    assert_eq!(h.cache.scope_len("t1:a1"), 0);

    let resp = h
        .orchestrator
        .search("ownership and borrowing rules", "t1", "a1", &opts)
        .await
        .unwrap();
    assert!(!resp.from_cache);
}

#[tokio::test]
async fn test_expansions_fan_out_and_merge() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;

    let opts = SearchOptions {
        expansions: vec!["short and stout".to_string()],
        ..SearchOptions::default()
    };
    let resp = h
        .orchestrator
        .search("ownership and borrowing rules", "t1", "a1", &opts)
        .await
        .unwrap();

    // One dense query for the primary, one per expansion (seed itself
    // issues none).
    assert_eq!(h.index.dense_query_count(), 2);
    assert!(resp.hits.iter().any(|f| f.hit.id == "ownership"));
    assert!(resp.hits.iter().any(|f| f.hit.id == "teapot"));
}

#[tokio::test]
async fn test_blank_query_returns_empty_without_calls() {
    let h = harness(false);

    let resp = h
        .orchestrator
        .search("   ", "t1", "a1", &SearchOptions::default())
        .await
        .unwrap();

    assert!(resp.hits.is_empty());
    assert!(!resp.from_cache);
    assert_eq!(h.embedder.call_count(), 0);
    assert_eq!(h.index.dense_query_count(), 0);
}

#[tokio::test]
async fn test_upsert_assigns_ids_and_invalidates() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;
    let opts = SearchOptions::default();

    h.orchestrator
        .search("ownership and borrowing rules", "t1", "a1", &opts)
        .await
        .unwrap();
    assert_eq!(h.cache.scope_len("t1:a1"), 1);

    let ids = h
        .orchestrator
        .upsert_passages(
            "t1",
            "a1",
            vec![
                PassageInput {
                    id: Some("fixed".to_string()),
                    text: "a passage with a fixed id".to_string(),
                    metadata: HitMetadata::Unknown,
                },
                PassageInput {
                    id: None,
                    text: "a passage with a generated id".to_string(),
                    metadata: HitMetadata::Unknown,
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], "fixed");
    assert!(!ids[1].is_empty());
    // Indexing new documents purged the stale cached results.
    assert_eq!(h.cache.scope_len("t1:a1"), 0);
}

#[tokio::test]
async fn test_drop_agent_index_removes_results() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;
    let opts = SearchOptions::default();

    let before = h
        .orchestrator
        .search("ownership and borrowing rules", "t1", "a1", &opts)
        .await
        .unwrap();
    assert!(!before.hits.is_empty());

    h.orchestrator.drop_agent_index("t1", "a1").await.unwrap();

    let after = h
        .orchestrator
        .search("ownership and borrowing rules", "t1", "a1", &opts)
        .await
        .unwrap();
    assert!(!after.from_cache);
    assert!(after.hits.is_empty());
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;

    let other = h
        .orchestrator
        .search(
            "ownership and borrowing rules",
            "t2",
            "a1",
            &SearchOptions::default(),
        )
        .await
        .unwrap();

    assert!(other.hits.is_empty());
}

#[tokio::test]
async fn test_rerank_keeps_exact_match_on_top() {
    let h = harness(true);
    seed(&h, "t1", "a1").await;

    let resp = h
        .orchestrator
        .search(
            "ownership and borrowing rules",
            "t1",
            "a1",
            &SearchOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(resp.degraded, None);
    assert_eq!(resp.hits[0].hit.id, "ownership");
}

#[tokio::test]
async fn test_query_embedding_is_cached() {
    let h = harness(false);
    seed(&h, "t1", "a1").await;

    let opts = SearchOptions {
        bypass_cache: true,
        ..SearchOptions::default()
    };
    h.orchestrator
        .search("ownership and borrowing rules", "t1", "a1", &opts)
        .await
        .unwrap();
    let calls_after_first = h.embedder.call_count();

    h.orchestrator
        .search("ownership and borrowing rules", "t1", "a1", &opts)
        .await
        .unwrap();

    // The second cycle reused the cached query vector.
    assert_eq!(h.embedder.call_count(), calls_after_first);
}
