//! Persistent cache store boundary (L2 tier).
//!
//! The store is a plain key/value interface with native expiry, matching
//! what Redis offers. The L2 tier enforces its own TTL; the engine never
//! second-guesses an L2 hit's freshness.

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;

/// Errors returned by the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not connect to the store endpoint.
    #[error("failed to connect to cache store at '{url}': {message}")]
    ConnectionFailed { url: String, message: String },

    /// A store command failed.
    #[error("cache store command failed: {message}")]
    CommandFailed { message: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::CommandFailed {
            message: err.to_string(),
        }
    }
}

/// Key/value store with native TTL support.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Writes a value with an expiry in whole seconds.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    /// Reads a value; `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Deletes a key (no-op if absent).
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Returns all keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

/// Redis-backed store.
#[derive(Clone)]
pub struct RedisStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Connects to `url` and starts a reconnecting connection manager.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::ConnectionFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            StoreError::ConnectionFailed {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Self { manager })
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        // Redis expiry floors at one second; a zero expiry would error.
        let ttl_secs = ttl_secs.max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock::MockCacheStore;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use crate::cache::types::glob_match;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::{Duration, Instant};

    struct MockEntry {
        value: Vec<u8>,
        expires_at: Instant,
    }

    /// In-memory stand-in for Redis with simulated native expiry.
    ///
    /// Counts accesses so tests can observe L2 traffic (promotion
    /// round-trips), and can be switched into a failing mode to exercise
    /// cache-fault degradation.
    #[derive(Default)]
    pub struct MockCacheStore {
        entries: parking_lot::Mutex<HashMap<String, MockEntry>>,
        get_count: AtomicU64,
        set_count: AtomicU64,
        failing: AtomicBool,
    }

    impl MockCacheStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of `get` calls observed.
        pub fn get_count(&self) -> u64 {
            self.get_count.load(Ordering::Relaxed)
        }

        /// Number of `set_with_expiry` calls observed.
        pub fn set_count(&self) -> u64 {
            self.set_count.load(Ordering::Relaxed)
        }

        /// Makes every subsequent operation fail.
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::Relaxed);
        }

        /// Number of live (unexpired) entries.
        pub fn len(&self) -> usize {
            let now = Instant::now();
            self.entries
                .lock()
                .values()
                .filter(|e| e.expires_at > now)
                .count()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        fn check_failing(&self) -> Result<(), StoreError> {
            if self.failing.load(Ordering::Relaxed) {
                Err(StoreError::CommandFailed {
                    message: "mock store in failing mode".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CacheStore for MockCacheStore {
        async fn set_with_expiry(
            &self,
            key: &str,
            value: Vec<u8>,
            ttl_secs: u64,
        ) -> Result<(), StoreError> {
            self.set_count.fetch_add(1, Ordering::Relaxed);
            self.check_failing()?;
            self.entries.lock().insert(
                key.to_string(),
                MockEntry {
                    value,
                    expires_at: Instant::now() + Duration::from_secs(ttl_secs),
                },
            );
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.get_count.fetch_add(1, Ordering::Relaxed);
            self.check_failing()?;
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(entry) if entry.expires_at <= Instant::now() => {
                    entries.remove(key);
                    Ok(None)
                }
                Some(entry) => Ok(Some(entry.value.clone())),
                None => Ok(None),
            }
        }

        async fn del(&self, key: &str) -> Result<(), StoreError> {
            self.check_failing()?;
            self.entries.lock().remove(key);
            Ok(())
        }

        async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
            self.check_failing()?;
            let now = Instant::now();
            Ok(self
                .entries
                .lock()
                .iter()
                .filter(|(_, e)| e.expires_at > now)
                .filter(|(k, _)| glob_match(pattern, k))
                .map(|(k, _)| k.clone())
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_store_round_trip() {
        let store = MockCacheStore::new();
        store
            .set_with_expiry("k", b"v".to_vec(), 60)
            .await
            .expect("set should succeed");

        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.get_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_store_expiry() {
        let store = MockCacheStore::new();
        store
            .set_with_expiry("k", b"v".to_vec(), 0)
            .await
            .expect("set should succeed");

        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_store_keys_pattern() {
        let store = MockCacheStore::new();
        store.set_with_expiry("hyb:a", vec![1], 60).await.unwrap();
        store.set_with_expiry("hyb:b", vec![2], 60).await.unwrap();
        store.set_with_expiry("emb:a", vec![3], 60).await.unwrap();

        let mut keys = store.keys("hyb:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["hyb:a", "hyb:b"]);
    }

    #[tokio::test]
    async fn test_mock_store_failing_mode() {
        let store = MockCacheStore::new();
        store.set_failing(true);
        assert!(store.get("k").await.is_err());
        assert!(store.set_with_expiry("k", vec![], 60).await.is_err());
    }
}
