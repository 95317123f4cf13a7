//! `QuiverDB` configuration.
//!
//! Configuration is merged from three sources via figment, lowest priority
//! first: built-in defaults, a `quiverdb.toml` file, and `QUIVERDB_*`
//! environment variables. Env keys mirror config keys one-for-one with
//! `__` separating sections, e.g. `QUIVERDB_SEARCH__MAX_WORKERS=8`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Environment variable namespace prefix.
pub const ENV_PREFIX: &str = "QUIVERDB_";

/// Storage configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory path.
    pub data_dir: String,
    /// Page size in bytes. Must be a power of two in `[512, 65536]`.
    pub page_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./quiverdb_data".to_string(),
            page_size: 4096,
        }
    }
}

/// Parallel search and query cache configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Enable the sharded parallel scan.
    pub parallel_enabled: bool,
    /// Worker count for parallel scans. 0 = logical CPU count.
    pub max_workers: usize,
    /// Per-worker batch size; collections smaller than
    /// `max_workers * batch_size` are scanned sequentially.
    pub batch_size: usize,
    /// Enable the query result cache.
    pub cache_enabled: bool,
    /// Maximum number of cached responses.
    pub cache_size: usize,
    /// Cache entry time-to-live in seconds.
    pub cache_ttl_secs: u64,
    /// Interval between background cache cleanup runs, in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            parallel_enabled: true,
            max_workers: 0,
            batch_size: 256,
            cache_enabled: true,
            cache_size: 1000,
            cache_ttl_secs: 300,
            cleanup_interval_secs: 60,
        }
    }
}

impl SearchConfig {
    /// Resolves the effective worker count.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.max_workers == 0 {
            std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
        } else {
            self.max_workers
        }
    }
}

/// I/O configuration section (mmap layer and async engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Map files into memory; fall back to buffered positioned I/O when off.
    pub use_mmap: bool,
    /// Open memory maps read-only.
    pub mmap_read_only: bool,
    /// Route page reads/writes through the async worker pool.
    pub async_enabled: bool,
    /// Async worker count. 0 = twice the logical CPU count.
    pub async_workers: usize,
    /// Bounded request queue length per worker.
    pub async_queue_size: usize,
    /// Write coalescing buffer size in bytes.
    pub write_buffer_size: usize,
    /// Write coalescing flush interval in milliseconds.
    pub flush_interval_ms: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            use_mmap: true,
            mmap_read_only: false,
            async_enabled: true,
            async_workers: 0,
            async_queue_size: 1024,
            write_buffer_size: 64 * 1024,
            flush_interval_ms: 100,
        }
    }
}

impl IoConfig {
    /// Resolves the effective async worker count.
    #[must_use]
    pub fn effective_async_workers(&self) -> usize {
        if self.async_workers == 0 {
            let cpus = std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
            cpus * 2
        } else {
            self.async_workers
        }
    }
}

/// SIMD configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimdConfig {
    /// Use explicit SIMD kernels; scalar reference kernels when off.
    pub enabled: bool,
    /// Shard batch operations across rayon.
    pub parallel_chunks: bool,
    /// Candidates per parallel chunk.
    pub chunk_size: usize,
}

impl Default for SimdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            parallel_chunks: true,
            chunk_size: 256,
        }
    }
}

/// Batch embedding pipeline configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Primary batch size for full-batch provider calls.
    pub batch_size: usize,
    /// Smaller slice size used when the full batch fails.
    pub fallback_batch_size: usize,
    /// Retry attempts per provider call.
    pub max_retries: usize,
    /// Delay between retries in milliseconds.
    pub retry_delay_ms: u64,
    /// Maximum concurrent fallback workers.
    pub max_workers: usize,
    /// Degrade to smaller slices (and finally per-item) on failure.
    pub fallback_enabled: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            fallback_batch_size: 8,
            max_retries: 3,
            retry_delay_ms: 200,
            max_workers: 4,
            fallback_enabled: true,
        }
    }
}

/// Default per-collection content storage policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Retain original text alongside vectors.
    pub enabled: bool,
    /// Reserved metadata field holding the text.
    pub field: String,
    /// Maximum retained bytes; longer text is truncated.
    pub max_bytes: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            field: "_content".to_string(),
            max_bytes: 65536,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    pub level: String,
    /// Log format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Main `QuiverDB` engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Parallel search and cache configuration.
    pub search: SearchConfig,
    /// I/O configuration.
    pub io: IoConfig,
    /// SIMD configuration.
    pub simd: SimdConfig,
    /// Embedding batch pipeline configuration.
    pub embedding: EmbeddingConfig,
    /// Default content storage policy.
    pub content: ContentConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Loads configuration from `quiverdb.toml` and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from_path("quiverdb.toml")
    }

    /// Loads configuration from a specific file path and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if parsing or validation fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string (defaults + overrides).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if parsing or validation fails.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let page = self.storage.page_size;
        if !(512..=65536).contains(&page) || !page.is_power_of_two() {
            return Err(Error::Config(format!(
                "storage.page_size: {page} must be a power of two in [512, 65536]"
            )));
        }

        if self.search.batch_size == 0 {
            return Err(Error::Config(
                "search.batch_size: must be positive".to_string(),
            ));
        }
        if self.search.cache_enabled && self.search.cache_size == 0 {
            return Err(Error::Config(
                "search.cache_size: must be positive when the cache is enabled".to_string(),
            ));
        }

        if self.io.async_queue_size == 0 {
            return Err(Error::Config(
                "io.async_queue_size: must be positive".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 || self.embedding.fallback_batch_size == 0 {
            return Err(Error::Config(
                "embedding: batch sizes must be positive".to_string(),
            ));
        }
        if self.embedding.fallback_batch_size > self.embedding.batch_size {
            return Err(Error::Config(format!(
                "embedding.fallback_batch_size: {} exceeds batch_size {}",
                self.embedding.fallback_batch_size, self.embedding.batch_size
            )));
        }
        if self.embedding.max_workers == 0 {
            return Err(Error::Config(
                "embedding.max_workers: must be positive".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(Error::Config(format!(
                "logging.level: '{}' is not one of {valid_levels:?}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}
