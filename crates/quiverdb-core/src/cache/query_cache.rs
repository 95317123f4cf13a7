//! Bounded TTL cache of search responses keyed by request fingerprint.
//!
//! The fingerprint is a hash over the canonical byte serialization of the
//! request: query vector bits, limit, offset, filter, and the include
//! flags. Two requests with equal fingerprints are indistinguishable to
//! the caller, so a cached response can be replayed verbatim (as a deep
//! copy).
//!
//! Invalidation is coarse: any mutation on the owning collection clears
//! the cache in full. A background task removes expired entries between
//! queries.

use super::lru::LruCache;
use crate::record::{SearchHit, SearchRequest};
use crossbeam_channel::{bounded, Sender};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

/// Query cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve responses from the cache at all.
    pub enabled: bool,
    /// Maximum number of cached responses.
    pub max_entries: usize,
    /// Entry time-to-live.
    pub ttl: Duration,
    /// Interval between background cleanup runs. Zero disables the task.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct QueryCacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Current entry count.
    pub entries: usize,
    /// Number of evictions.
    pub evictions: u64,
    /// Number of background cleanup runs.
    pub cleanup_runs: u64,
}

impl QueryCacheStats {
    /// Hit rate in `[0.0, 1.0]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CachedResponse {
    hits: Vec<SearchHit>,
    created: Instant,
}

/// Computes the canonical fingerprint of a search request.
///
/// f32 components are hashed by bit pattern so equal vectors fingerprint
/// equally without float equality hazards.
#[must_use]
pub fn fingerprint(request: &SearchRequest) -> u64 {
    let mut hasher = FxHasher::default();
    for component in &request.vector {
        component.to_bits().hash(&mut hasher);
    }
    request.limit.hash(&mut hasher);
    request.offset.hash(&mut hasher);
    match &request.filter {
        // Filters have no Hash impl; their canonical JSON form does.
        Some(filter) => serde_json::to_string(filter)
            .unwrap_or_default()
            .hash(&mut hasher),
        None => 0u8.hash(&mut hasher),
    }
    request.include_vector.hash(&mut hasher);
    request.include_metadata.hash(&mut hasher);
    request.include_content.hash(&mut hasher);
    hasher.finish()
}

/// Bounded LRU of recent search responses with TTL expiry.
pub struct QueryCache {
    config: CacheConfig,
    entries: Arc<LruCache<u64, Arc<CachedResponse>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    cleanup_runs: Arc<AtomicU64>,
    cleanup_shutdown: Option<Sender<()>>,
    cleanup_handle: Option<JoinHandle<()>>,
}

impl QueryCache {
    /// Creates a new query cache, spawning the cleanup task when enabled.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let entries = Arc::new(LruCache::new(config.max_entries));
        let cleanup_runs = Arc::new(AtomicU64::new(0));

        let (cleanup_shutdown, cleanup_handle) = if config.enabled
            && !config.cleanup_interval.is_zero()
        {
            let (tx, rx) = bounded::<()>(1);
            let entries = Arc::clone(&entries);
            let runs = Arc::clone(&cleanup_runs);
            let ttl = config.ttl;
            let interval = config.cleanup_interval;

            let handle = std::thread::Builder::new()
                .name("quiver-cache-cleanup".to_string())
                .spawn(move || {
                    while rx.recv_timeout(interval).is_err() {
                        let now = Instant::now();
                        entries.retain(|_, entry: &Arc<CachedResponse>| {
                            now.duration_since(entry.created) < ttl
                        });
                        runs.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .expect("failed to spawn cache cleanup thread");

            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        Self {
            config,
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            cleanup_runs,
            cleanup_shutdown,
            cleanup_handle,
        }
    }

    /// Returns true if the cache serves responses.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Looks up a response by fingerprint.
    ///
    /// An expired entry counts as a miss and is removed.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<Vec<SearchHit>> {
        if !self.config.enabled {
            return None;
        }

        match self.entries.get(&key) {
            Some(entry) => {
                if entry.created.elapsed() >= self.config.ttl {
                    self.entries.remove(&key);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                } else {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Some(entry.hits.clone())
                }
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a deep copy of a response under its fingerprint.
    pub fn insert(&self, key: u64, hits: Vec<SearchHit>) {
        if !self.config.enabled {
            return;
        }
        self.entries.insert(
            key,
            Arc::new(CachedResponse {
                hits,
                created: Instant::now(),
            }),
        );
    }

    /// Clears the cache. Called on every mutation of the owning collection.
    pub fn invalidate_all(&self) {
        if self.entries.is_empty() {
            return;
        }
        debug!("invalidating query cache");
        self.entries.clear();
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> QueryCacheStats {
        QueryCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
            evictions: self.entries.evictions(),
            cleanup_runs: self.cleanup_runs.load(Ordering::Relaxed),
        }
    }
}

impl Drop for QueryCache {
    fn drop(&mut self) {
        if let Some(tx) = self.cleanup_shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.cleanup_handle.take() {
            let _ = handle.join();
        }
    }
}
