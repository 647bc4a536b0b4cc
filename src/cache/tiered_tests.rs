use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::policy::{CacheNamespace, NamespacePolicy, PolicyRegistry, default_policies};
use super::store::{CacheStore, MockCacheStore};
use super::tiered::CacheEngine;

/// Registry with a tiny, fast-expiring HybridResults namespace.
fn test_registry(ttl: Duration, l1_capacity: usize) -> PolicyRegistry {
    let mut table: HashMap<CacheNamespace, NamespacePolicy> = default_policies();
    table.insert(
        CacheNamespace::HybridResults,
        NamespacePolicy::new(ttl, l1_capacity, "hyb:"),
    );
    PolicyRegistry::new(table).expect("test table covers every namespace")
}

fn engine_with(
    ttl: Duration,
    l1_capacity: usize,
) -> (CacheEngine, Arc<MockCacheStore>) {
    let store = Arc::new(MockCacheStore::new());
    let engine = CacheEngine::new(test_registry(ttl, l1_capacity), store.clone());
    (engine, store)
}

const NS: CacheNamespace = CacheNamespace::HybridResults;

#[tokio::test]
async fn test_set_then_get_round_trip() {
    let (engine, _) = engine_with(Duration::from_secs(60), 0);

    engine.set(NS, "a", 42u32, None).await;
    assert_eq!(engine.get::<u32>(NS, "a").await, Some(42));
}

#[tokio::test]
async fn test_get_absent_in_both_tiers() {
    let (engine, _) = engine_with(Duration::from_secs(60), 0);
    assert_eq!(engine.get::<u32>(NS, "missing").await, None);
}

#[tokio::test]
async fn test_l1_ttl_expiry_is_a_miss() {
    // Zero TTL in L1; the mock L2 floors at one second, so delete the L2
    // copy to isolate L1 behavior.
    let (engine, store) = engine_with(Duration::ZERO, 0);

    engine.set(NS, "a", 7u32, None).await;
    store.del("hyb:a").await.unwrap();

    assert_eq!(engine.get::<u32>(NS, "a").await, None);
    assert_eq!(engine.get::<u32>(NS, "a").await, None);
}

#[tokio::test]
async fn test_capacity_two_evicts_oldest_insertion() {
    // Worked example: capacity 2, insert a, b, c -> a evicted.
    let (engine, store) = engine_with(Duration::from_secs(2), 2);

    engine.set(NS, "a", 1u32, None).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    engine.set(NS, "b", 2u32, None).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    engine.set(NS, "c", 3u32, None).await;

    assert_eq!(engine.l1_len(NS), 2);

    // Drop L2 copies so the assertion observes L1 eviction, not an L2
    // promotion.
    store.del("hyb:a").await.unwrap();

    assert_eq!(engine.get::<u32>(NS, "a").await, None);
    assert_eq!(engine.get::<u32>(NS, "b").await, Some(2));
    assert_eq!(engine.get::<u32>(NS, "c").await, Some(3));
}

#[tokio::test]
async fn test_l2_hit_promotes_into_l1() {
    let (engine, store) = engine_with(Duration::from_secs(60), 0);

    // Seed L2 only, simulating an L1 eviction.
    store
        .set_with_expiry("hyb:a", serde_json::to_vec(&99u32).unwrap(), 60)
        .await
        .unwrap();

    let before = store.get_count();
    assert_eq!(engine.get::<u32>(NS, "a").await, Some(99));
    assert_eq!(store.get_count(), before + 1);

    // Second read must be served from L1: no further L2 traffic.
    assert_eq!(engine.get::<u32>(NS, "a").await, Some(99));
    assert_eq!(store.get_count(), before + 1);
    assert_eq!(engine.l1_len(NS), 1);
}

#[tokio::test]
async fn test_l2_write_failure_does_not_block_l1() {
    let (engine, store) = engine_with(Duration::from_secs(60), 0);
    store.set_failing(true);

    engine.set(NS, "a", 5u32, None).await;
    // L2 is down, so the read degrades to L1 which still has the entry.
    assert_eq!(engine.get::<u32>(NS, "a").await, Some(5));
}

#[tokio::test]
async fn test_l2_read_failure_degrades_to_miss() {
    let (engine, store) = engine_with(Duration::from_secs(60), 0);
    store.set_failing(true);
    assert_eq!(engine.get::<u32>(NS, "zzz").await, None);
}

#[tokio::test]
async fn test_corrupt_l2_payload_degrades_to_miss() {
    let (engine, store) = engine_with(Duration::from_secs(60), 0);
    store
        .set_with_expiry("hyb:bad", b"not json".to_vec(), 60)
        .await
        .unwrap();

    assert_eq!(engine.get::<u32>(NS, "bad").await, None);
}

#[tokio::test]
async fn test_delete_removes_both_tiers() {
    let (engine, store) = engine_with(Duration::from_secs(60), 0);

    engine.set(NS, "a", 1u32, None).await;
    engine.delete(NS, "a").await;

    assert_eq!(engine.get::<u32>(NS, "a").await, None);
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn test_delete_pattern_scans_both_tiers() {
    let (engine, store) = engine_with(Duration::from_secs(60), 0);

    engine.set(NS, "t1:q1", 1u32, None).await;
    engine.set(NS, "t1:q2", 2u32, None).await;
    engine.set(NS, "t2:q1", 3u32, None).await;

    engine.delete_pattern(NS, "t1:*").await;

    assert_eq!(engine.get::<u32>(NS, "t1:q1").await, None);
    assert_eq!(engine.get::<u32>(NS, "t1:q2").await, None);
    assert_eq!(engine.get::<u32>(NS, "t2:q1").await, Some(3));
    assert_eq!(store.keys("hyb:*").await.unwrap(), vec!["hyb:t2:q1"]);
}

#[tokio::test]
async fn test_clear_empties_namespace() {
    let (engine, _) = engine_with(Duration::from_secs(60), 0);

    engine.set(NS, "a", 1u32, None).await;
    engine.set(NS, "b", 2u32, None).await;
    engine.clear(NS).await;

    assert_eq!(engine.l1_len(NS), 0);
    assert_eq!(engine.get::<u32>(NS, "a").await, None);
}

#[tokio::test]
async fn test_explicit_ttl_overrides_policy_default() {
    let (engine, store) = engine_with(Duration::from_secs(60), 0);

    engine
        .set(NS, "short", 1u32, Some(Duration::ZERO))
        .await;
    store.del("hyb:short").await.unwrap();

    assert_eq!(engine.get::<u32>(NS, "short").await, None);
}

#[tokio::test]
async fn test_invalidate_scope_purges_registered_keys() {
    let (engine, _) = engine_with(Duration::from_secs(60), 0);

    engine
        .set_scoped(NS, "q1", 1u32, None, "t1:a1")
        .await;
    engine
        .set_scoped(NS, "q2", 2u32, None, "t1:a1")
        .await;
    engine
        .set_scoped(NS, "q3", 3u32, None, "t2:a1")
        .await;

    assert_eq!(engine.scope_len("t1:a1"), 2);
    engine.invalidate_scope("t1:a1").await;

    assert_eq!(engine.scope_len("t1:a1"), 0);
    assert_eq!(engine.get::<u32>(NS, "q1").await, None);
    assert_eq!(engine.get::<u32>(NS, "q2").await, None);
    assert_eq!(engine.get::<u32>(NS, "q3").await, Some(3));
}

#[tokio::test]
async fn test_invalidate_unknown_scope_is_noop() {
    let (engine, _) = engine_with(Duration::from_secs(60), 0);
    engine.set(NS, "a", 1u32, None).await;
    engine.invalidate_scope("nope").await;
    assert_eq!(engine.get::<u32>(NS, "a").await, Some(1));
}

#[tokio::test]
async fn test_namespaces_do_not_collide() {
    let (engine, _) = engine_with(Duration::from_secs(60), 0);

    engine.set(CacheNamespace::Embedding, "a", 1u32, None).await;
    engine.set(NS, "a", 2u32, None).await;

    assert_eq!(
        engine.get::<u32>(CacheNamespace::Embedding, "a").await,
        Some(1)
    );
    assert_eq!(engine.get::<u32>(NS, "a").await, Some(2));
}

#[tokio::test]
async fn test_concurrent_readers_and_writers() {
    let (engine, _) = engine_with(Duration::from_secs(60), 8);
    let engine = Arc::new(engine);

    let mut tasks = Vec::new();
    for i in 0..16u32 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let key = format!("k{}", i % 4);
            engine.set(NS, &key, i, None).await;
            let _ = engine.get::<u32>(NS, &key).await;
        }));
    }
    for task in tasks {
        task.await.expect("task should not panic");
    }

    assert!(engine.l1_len(NS) <= 8);
}
