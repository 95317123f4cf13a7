//! Query result caching.
//!
//! A bounded LRU ([`LruCache`]) provides the eviction mechanics; the
//! [`QueryCache`] layers TTL expiry, canonical request fingerprints, and a
//! background cleanup task on top.

mod lru;
mod query_cache;

#[cfg(test)]
mod lru_tests;

pub use lru::LruCache;
pub use query_cache::{fingerprint, CacheConfig, QueryCache, QueryCacheStats};
