//! Shared harness for integration tests: a full retrieval stack wired
//! onto mocks.

#![allow(dead_code)]

use std::sync::Arc;

use recall::{
    CacheEngine, CacheStore, HitMetadata, MockCacheStore, MockEmbedder, MockVectorIndex,
    OrchestratorConfig, PassageInput, PolicyRegistry, RetrievalOrchestrator,
};

pub const DIM: usize = 16;

pub struct TestStack {
    pub orchestrator: RetrievalOrchestrator,
    pub cache: Arc<CacheEngine>,
    pub store: Arc<MockCacheStore>,
    pub embedder: Arc<MockEmbedder>,
    pub index: Arc<MockVectorIndex>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds a stack on a fresh mock store.
pub fn build_stack() -> TestStack {
    build_stack_on(Arc::new(MockCacheStore::new()))
}

/// Builds a stack sharing an existing L2 store, simulating a second
/// process attached to the same persistent tier.
pub fn build_stack_on(store: Arc<MockCacheStore>) -> TestStack {
    let cache = Arc::new(CacheEngine::new(
        PolicyRegistry::with_defaults(),
        Arc::clone(&store) as Arc<dyn CacheStore>,
    ));
    let embedder = Arc::new(MockEmbedder::new(DIM));
    let index = Arc::new(MockVectorIndex::new());

    let orchestrator = RetrievalOrchestrator::new(
        OrchestratorConfig {
            rerank_enabled: false,
            ..OrchestratorConfig::default()
        },
        Arc::clone(&cache),
        Arc::clone(&embedder) as _,
        Arc::clone(&index) as _,
    );

    TestStack {
        orchestrator,
        cache,
        store,
        embedder,
        index,
    }
}

/// Indexes a small knowledge base for (tenant, agent).
pub async fn seed_knowledge_base(stack: &TestStack, tenant: &str, agent: &str) -> Vec<String> {
    let passages = vec![
        passage("refunds", "refund requests are processed within five business days"),
        passage("shipping", "standard shipping takes three to seven days"),
        passage("warranty", "the limited warranty covers manufacturing defects"),
        passage("returns", "items can be returned unworn within thirty days"),
    ];

    stack
        .orchestrator
        .upsert_passages(tenant, agent, passages)
        .await
        .expect("seeding should succeed")
}

pub fn passage(id: &str, text: &str) -> PassageInput {
    PassageInput {
        id: Some(id.to_string()),
        text: text.to_string(),
        metadata: HitMetadata::Unknown,
    }
}
