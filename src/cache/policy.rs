//! Cache namespaces and their policies.
//!
//! Every namespace has exactly one policy, registered once at startup.
//! There is a single policy table with a single time unit (internal
//! [`Duration`], millisecond precision); conversion to whole seconds
//! happens exactly once, at the L2 boundary.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::ConfigError;

/// Closed set of cache policy domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Agent configuration looked up by the CRUD layer.
    Agent,
    /// Assembled retrieval context blobs.
    Context,
    /// Per-index sparse-capability probe results.
    VectorAvailability,
    /// Query embeddings.
    Embedding,
    /// Fully fused (and possibly reranked) search results.
    HybridResults,
}

impl CacheNamespace {
    /// All namespaces. The registry constructor iterates this to enforce
    /// the one-policy-per-namespace invariant.
    pub const ALL: [CacheNamespace; 5] = [
        CacheNamespace::Agent,
        CacheNamespace::Context,
        CacheNamespace::VectorAvailability,
        CacheNamespace::Embedding,
        CacheNamespace::HybridResults,
    ];

    /// Stable string tag, used in storage key prefixes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::Agent => "agent",
            CacheNamespace::Context => "context",
            CacheNamespace::VectorAvailability => "vector_availability",
            CacheNamespace::Embedding => "embedding",
            CacheNamespace::HybridResults => "hybrid_results",
        }
    }
}

impl std::fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-namespace cache policy. Immutable after startup.
#[derive(Debug, Clone)]
pub struct NamespacePolicy {
    /// TTL applied when a `set` does not carry an explicit one. Also the
    /// fresh window granted to entries promoted from L2 into L1.
    pub default_ttl: Duration,
    /// Max L1 entries for this namespace. `0` means unbounded.
    pub l1_capacity: usize,
    /// Prefix prepended to every key in this namespace.
    pub key_prefix: &'static str,
}

impl NamespacePolicy {
    pub fn new(default_ttl: Duration, l1_capacity: usize, key_prefix: &'static str) -> Self {
        Self {
            default_ttl,
            l1_capacity,
            key_prefix,
        }
    }
}

/// The compiled-in policy table.
///
/// Embeddings are expensive to recompute and tiny, so they get a long TTL
/// and a large tier; hybrid results are volatile (documents change) and
/// get a short one.
pub fn default_policies() -> HashMap<CacheNamespace, NamespacePolicy> {
    HashMap::from([
        (
            CacheNamespace::Agent,
            NamespacePolicy::new(Duration::from_secs(300), 1_000, "ag:"),
        ),
        (
            CacheNamespace::Context,
            NamespacePolicy::new(Duration::from_secs(120), 2_000, "ctx:"),
        ),
        (
            CacheNamespace::VectorAvailability,
            NamespacePolicy::new(Duration::from_secs(600), 500, "va:"),
        ),
        (
            CacheNamespace::Embedding,
            NamespacePolicy::new(Duration::from_secs(3600), 10_000, "emb:"),
        ),
        (
            CacheNamespace::HybridResults,
            NamespacePolicy::new(Duration::from_secs(60), 2_000, "hyb:"),
        ),
    ])
}

/// Static namespace → policy table, validated at construction.
#[derive(Debug)]
pub struct PolicyRegistry {
    policies: HashMap<CacheNamespace, NamespacePolicy>,
}

impl PolicyRegistry {
    /// Builds a registry, failing fast if any namespace lacks a policy.
    pub fn new(policies: HashMap<CacheNamespace, NamespacePolicy>) -> Result<Self, ConfigError> {
        for namespace in CacheNamespace::ALL {
            if !policies.contains_key(&namespace) {
                return Err(ConfigError::MissingNamespacePolicy { namespace });
            }
        }
        Ok(Self { policies })
    }

    /// Builds a registry over the compiled-in table.
    pub fn with_defaults() -> Self {
        Self::new(default_policies()).expect("default policy table covers every namespace")
    }

    /// Returns the policy for a namespace. Infallible: construction
    /// guaranteed full coverage.
    pub fn policy(&self, namespace: CacheNamespace) -> &NamespacePolicy {
        self.policies
            .get(&namespace)
            .expect("registry construction validated full namespace coverage")
    }
}
