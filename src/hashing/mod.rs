//! BLAKE3-based key derivation.
//!
//! Cache keys built from user-controlled text (queries) are always passed
//! through a fixed-length digest so lookups are O(1) and no raw query text
//! ever appears in storage keys.

use blake3::Hasher;

use crate::fusion::HybridWeights;

/// Computes a 64-bit hash of the input, truncated from the 256-bit BLAKE3
/// output.
///
/// 64 bits is plenty for cache keys and tenant/agent identifiers: a
/// collision degrades to a cache miss or an over-broad filter, never to
/// data corruption, and the birthday bound sits at ~4.3 billion items.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

#[inline]
pub fn hash_tenant_id(tenant: &str) -> u64 {
    hash_to_u64(tenant.as_bytes())
}

#[inline]
pub fn hash_agent_id(agent: &str) -> u64 {
    hash_to_u64(agent.as_bytes())
}

/// Derives the cache key for a search request.
///
/// The digest covers the normalized query, the tenant and agent scope, and
/// the fusion weights (requests with different weights must not share a
/// cached result). A `|` separator between fields prevents boundary
/// ambiguity between adjacent inputs.
pub fn hash_query_key(
    normalized_query: &str,
    tenant_id: &str,
    agent_id: &str,
    weights: &HybridWeights,
) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(normalized_query.as_bytes());
    hasher.update(b"|");
    hasher.update(tenant_id.as_bytes());
    hasher.update(b"|");
    hasher.update(agent_id.as_bytes());
    hasher.update(b"|");
    hasher.update(&weights.dense.to_le_bytes());
    hasher.update(&weights.sparse.to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Renders a 32-byte digest as lowercase hex for use in storage keys.
pub fn hash_to_hex(hash: &[u8; 32]) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
