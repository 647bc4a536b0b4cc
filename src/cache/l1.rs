//! L1 in-process cache tier.
//!
//! Holds live values (`Arc<dyn Any>`), never serialized copies. TTL is
//! checked lazily on read; capacity eviction removes the entry with the
//! smallest `created_at` (insertion-order FIFO). Downstream namespaces
//! share size limits on the assumption that long-lived entries outlive
//! short-lived ones in insertion order, so this must stay FIFO and not
//! be changed to true LRU.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A single L1 entry: a live value plus its expiry window.
#[derive(Clone)]
pub struct L1Entry {
    value: Arc<dyn Any + Send + Sync>,
    created_at: Instant,
    ttl: Duration,
}

impl L1Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// In-process tier with per-instance capacity.
///
/// The mutex guards map mutation only; it is never held across an await
/// point (the tier has no async operations at all).
pub struct L1Cache {
    entries: Mutex<HashMap<String, L1Entry>>,
    capacity: usize,
}

impl L1Cache {
    /// Creates a tier. `capacity == 0` means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Looks up a live value, enforcing TTL lazily.
    ///
    /// An expired entry is removed on the read that observes it and
    /// reported as a miss; subsequent reads are plain misses.
    pub fn get(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(Arc::clone(&entry.value)),
            None => None,
        }
    }

    /// Inserts a value, evicting the oldest-inserted entry first if the
    /// tier is at capacity.
    ///
    /// Eviction happens before insertion and removes exactly one entry:
    /// the one with the smallest `created_at`. Overwriting an existing
    /// key never triggers eviction.
    pub fn insert(&self, key: String, value: Arc<dyn Any + Send + Sync>, ttl: Duration) {
        let mut entries = self.entries.lock();

        if self.capacity > 0 && !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest_key) = oldest {
                entries.remove(&oldest_key);
            }
        }

        entries.insert(
            key,
            L1Entry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Removes a single key.
    pub fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Removes every key matched by `predicate`.
    pub fn remove_matching(&self, predicate: impl Fn(&str) -> bool) {
        self.entries.lock().retain(|key, _| !predicate(key));
    }

    /// Returns the number of entries, counting any not-yet-collected
    /// expired ones.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if the tier is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns the keys currently held (test and invalidation support).
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

impl std::fmt::Debug for L1Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L1Cache")
            .field("entries", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
