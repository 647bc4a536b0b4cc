//! Two-tier cache engine: in-process L1 + persistent L2.
//!
//! Every operation is best-effort: a fault in either tier (network,
//! serialization) is logged and degraded to a miss. The engine never
//! returns an error to callers, and never holds the L1 lock across an
//! L2 call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::l1::L1Cache;
use super::policy::{CacheNamespace, PolicyRegistry};
use super::store::CacheStore;
use super::types::{CacheFault, glob_match};

/// Two-tier namespaced cache.
///
/// L1 holds live values per namespace; L2 holds serialized copies with
/// native expiry. An L2 hit is authoritative (its store enforced TTL)
/// and is promoted into L1 with the namespace's full default TTL, a
/// deliberate simplification that grants promoted entries a fresh
/// window.
pub struct CacheEngine {
    registry: PolicyRegistry,
    tiers: HashMap<CacheNamespace, L1Cache>,
    store: Arc<dyn CacheStore>,
    groups: Mutex<HashMap<String, HashSet<(CacheNamespace, String)>>>,
}

impl CacheEngine {
    /// Builds the engine, sizing one L1 tier per namespace from its
    /// policy.
    pub fn new(registry: PolicyRegistry, store: Arc<dyn CacheStore>) -> Self {
        let tiers = CacheNamespace::ALL
            .into_iter()
            .map(|ns| (ns, L1Cache::new(registry.policy(ns).l1_capacity)))
            .collect();

        Self {
            registry,
            tiers,
            store,
            groups: Mutex::new(HashMap::new()),
        }
    }

    fn full_key(&self, namespace: CacheNamespace, key: &str) -> String {
        format!("{}{}", self.registry.policy(namespace).key_prefix, key)
    }

    fn tier(&self, namespace: CacheNamespace) -> &L1Cache {
        self.tiers
            .get(&namespace)
            .expect("engine construction created a tier for every namespace")
    }

    /// Looks up a value, checking L1 then L2.
    ///
    /// Any tier fault degrades to `None`.
    #[instrument(skip(self), fields(namespace = %namespace))]
    pub async fn get<T>(&self, namespace: CacheNamespace, key: &str) -> Option<T>
    where
        T: Clone + DeserializeOwned + Send + Sync + 'static,
    {
        let full_key = self.full_key(namespace, key);

        if let Some(value) = self.tier(namespace).get(&full_key) {
            if let Some(typed) = value.downcast_ref::<T>() {
                debug!("L1 hit");
                return Some(typed.clone());
            }
            // A type mismatch means the key was reused across value
            // types; treat as a miss and let the next set overwrite it.
            warn!("L1 entry type mismatch, treating as miss");
        }

        let bytes = match self.store.get(&full_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("miss in both tiers");
                return None;
            }
            Err(e) => {
                let fault = CacheFault::Store {
                    key: full_key,
                    reason: e.to_string(),
                };
                warn!(%fault, "L2 read fault, degrading to miss");
                return None;
            }
        };

        let value: T = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                let fault = CacheFault::Deserialize {
                    key: full_key,
                    reason: e.to_string(),
                };
                warn!(%fault, "L2 payload undecodable, degrading to miss");
                return None;
            }
        };

        // Promote with the namespace default TTL, not the remaining L2
        // window.
        let default_ttl = self.registry.policy(namespace).default_ttl;
        self.tier(namespace)
            .insert(full_key, Arc::new(value.clone()), default_ttl);
        debug!("L2 hit, promoted into L1");

        Some(value)
    }

    /// Writes a value to both tiers.
    ///
    /// The L1 write always happens; the L2 write is best-effort and a
    /// failure there is logged, never surfaced.
    #[instrument(skip(self, value), fields(namespace = %namespace))]
    pub async fn set<T>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: T,
        ttl: Option<Duration>,
    ) where
        T: Clone + Serialize + Send + Sync + 'static,
    {
        let full_key = self.full_key(namespace, key);
        let ttl = ttl.unwrap_or(self.registry.policy(namespace).default_ttl);

        let serialized = match serde_json::to_vec(&value) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                let fault = CacheFault::Serialize {
                    key: full_key.clone(),
                    reason: e.to_string(),
                };
                warn!(%fault, "value not serializable, skipping L2 write");
                None
            }
        };

        self.tier(namespace)
            .insert(full_key.clone(), Arc::new(value), ttl);

        if let Some(bytes) = serialized {
            let ttl_secs = ttl.as_secs().max(1);
            if let Err(e) = self.store.set_with_expiry(&full_key, bytes, ttl_secs).await {
                let fault = CacheFault::Store {
                    key: full_key,
                    reason: e.to_string(),
                };
                warn!(%fault, "L2 write fault, entry lives in L1 only");
            }
        }
    }

    /// Writes a value and registers it into the invalidation group for
    /// `scope`, so a later [`CacheEngine::invalidate_scope`] purges it.
    pub async fn set_scoped<T>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: T,
        ttl: Option<Duration>,
        scope: &str,
    ) where
        T: Clone + Serialize + Send + Sync + 'static,
    {
        self.set(namespace, key, value, ttl).await;
        self.groups
            .lock()
            .entry(scope.to_string())
            .or_default()
            .insert((namespace, key.to_string()));
    }

    /// Deletes a single key from both tiers.
    #[instrument(skip(self), fields(namespace = %namespace))]
    pub async fn delete(&self, namespace: CacheNamespace, key: &str) {
        let full_key = self.full_key(namespace, key);
        self.tier(namespace).remove(&full_key);

        if let Err(e) = self.store.del(&full_key).await {
            let fault = CacheFault::Store {
                key: full_key,
                reason: e.to_string(),
            };
            warn!(%fault, "L2 delete fault");
        }
    }

    /// Deletes every key matching a glob (single `*` wildcard) from both
    /// tiers.
    #[instrument(skip(self), fields(namespace = %namespace, pattern = pattern))]
    pub async fn delete_pattern(&self, namespace: CacheNamespace, pattern: &str) {
        let full_pattern = self.full_key(namespace, pattern);

        self.tier(namespace)
            .remove_matching(|key| glob_match(&full_pattern, key));

        match self.store.keys(&full_pattern).await {
            Ok(keys) => {
                debug!(matched = keys.len(), "deleting matched L2 keys");
                for key in keys {
                    if let Err(e) = self.store.del(&key).await {
                        let fault = CacheFault::Store {
                            key,
                            reason: e.to_string(),
                        };
                        warn!(%fault, "L2 delete fault during pattern delete");
                    }
                }
            }
            Err(e) => {
                let fault = CacheFault::Store {
                    key: full_pattern,
                    reason: e.to_string(),
                };
                warn!(%fault, "L2 key scan fault, pattern delete incomplete");
            }
        }
    }

    /// Removes every entry in a namespace from both tiers.
    pub async fn clear(&self, namespace: CacheNamespace) {
        self.delete_pattern(namespace, "*").await;
    }

    /// Purges every cache key registered under `scope` and drops the
    /// group.
    ///
    /// Safe to run concurrently with reads: an in-flight read may see
    /// stale-then-absent data, which is acceptable.
    #[instrument(skip(self))]
    pub async fn invalidate_scope(&self, scope: &str) {
        let members = self.groups.lock().remove(scope);

        let Some(members) = members else {
            debug!("no invalidation group for scope");
            return;
        };

        debug!(keys = members.len(), "purging invalidation group");
        for (namespace, key) in members {
            self.delete(namespace, &key).await;
        }
    }

    /// Number of keys tracked for a scope (observability and tests).
    pub fn scope_len(&self, scope: &str) -> usize {
        self.groups.lock().get(scope).map_or(0, |g| g.len())
    }

    /// Current L1 entry count for a namespace.
    pub fn l1_len(&self, namespace: CacheNamespace) -> usize {
        self.tier(namespace).len()
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("groups", &self.groups.lock().len())
            .finish_non_exhaustive()
    }
}
