//! Two-tier namespaced cache engine.

pub mod l1;
pub mod policy;
pub mod store;
pub mod tiered;
pub mod types;

#[cfg(test)]
mod tiered_tests;

pub use l1::L1Cache;
pub use policy::{CacheNamespace, NamespacePolicy, PolicyRegistry, default_policies};
pub use store::{CacheStore, RedisStore, StoreError};
#[cfg(any(test, feature = "mock"))]
pub use store::MockCacheStore;
pub use tiered::CacheEngine;
pub use types::{CacheFault, glob_match};
