//! # `QuiverDB` Core
//!
//! Embedded vector database engine written in Rust.
//!
//! `QuiverDB` stores high-dimensional float32 vectors with JSON metadata
//! and optional original text, and answers exact (flat) or approximate
//! (HNSW) k-nearest-neighbor queries under cosine, euclidean, dot-product,
//! or manhattan distance.
//!
//! ## Features
//!
//! - **Flat and HNSW indexes** behind one [`index::VectorIndex`] trait
//! - **Crash-consistent persistence**: fixed-size pages behind a
//!   write-ahead log, replayed on open
//! - **Parallel search** with a fingerprint-keyed LRU query cache
//! - **Batch embedding** with retries and per-item fallback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quiverdb_core::{CancelToken, CollectionConfig, Database, DistanceMetric, IndexKind};
//!
//! let db = Database::open("./data")?;
//! let docs = db.create_collection(CollectionConfig::new(
//!     "docs", 768, DistanceMetric::Cosine, IndexKind::Hnsw,
//! ))?;
//!
//! docs.insert(VectorRecord::new("a", embedding, None), &CancelToken::never())?;
//! let hits = docs.search(&SearchRequest::new(query, 10), &CancelToken::never())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod cancel;
pub mod collection;
pub mod config;
pub mod distance;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod index;
pub mod record;
pub mod search;
pub mod simd;
pub mod storage;

mod util;

#[cfg(test)]
mod config_tests;

pub use cancel::CancelToken;
pub use collection::{Collection, CollectionConfig, CollectionInfo, ContentPolicy};
pub use config::EngineConfig;
pub use distance::DistanceMetric;
pub use error::{Error, ErrorKind, Result};
pub use filter::{Condition, Filter};
pub use index::IndexKind;
pub use record::{SearchHit, SearchRequest, VectorRecord};

use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Name of the advisory lock file guarding a data directory.
const LOCK_FILE: &str = "LOCK";

/// Top-level container of named collections.
///
/// A database exclusively owns its data directory; an advisory file lock
/// keeps a second process from opening it concurrently.
pub struct Database {
    data_dir: PathBuf,
    config: EngineConfig,
    /// Held for the lifetime of the database; the lock releases on drop.
    _lock_file: std::fs::File,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens or creates a database at `path` with the default engine
    /// configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] when another process holds the directory,
    /// IO/config errors otherwise.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, EngineConfig::default())
    }

    /// Opens or creates a database with an explicit configuration.
    ///
    /// Existing collection directories are opened eagerly; each replays
    /// its log and validates its index snapshot.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] when another process holds the directory,
    /// IO/config errors otherwise.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(data_dir.join(LOCK_FILE))?;
        lock_file.try_lock_exclusive().map_err(|_| {
            Error::Busy(format!(
                "data directory '{}' is locked by another process",
                data_dir.display()
            ))
        })?;

        let mut collections = HashMap::new();
        for entry in std::fs::read_dir(&data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || !path.join("config.json").exists() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match Collection::open(path, &config) {
                Ok(collection) => {
                    collections.insert(name, Arc::new(collection));
                }
                Err(err) => {
                    // A corrupt collection refuses operations; the rest of
                    // the database stays usable.
                    warn!(name, error = %err, "failed to open collection");
                    if !matches!(err, Error::IndexCorrupted(_)) {
                        return Err(err);
                    }
                }
            }
        }

        info!(
            dir = %data_dir.display(),
            collections = collections.len(),
            "opened database"
        );
        Ok(Self {
            data_dir,
            config,
            _lock_file: lock_file,
            collections: RwLock::new(collections),
        })
    }

    /// The engine configuration this database runs with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds a collection config seeded with this database's default
    /// content policy.
    #[must_use]
    pub fn collection_config(
        &self,
        name: impl Into<String>,
        dimension: usize,
        metric: DistanceMetric,
        index_kind: IndexKind,
    ) -> CollectionConfig {
        CollectionConfig::new(name, dimension, metric, index_kind)
            .with_content_policy(ContentPolicy::from(&self.config.content))
    }

    /// Creates a new collection.
    ///
    /// # Errors
    ///
    /// [`Error::CollectionExists`] for a duplicate name,
    /// `InvalidArgument` for a bad name or dimension.
    pub fn create_collection(&self, config: CollectionConfig) -> Result<Arc<Collection>> {
        let mut collections = self.collections.write();
        if collections.contains_key(&config.name) {
            return Err(Error::CollectionExists(config.name));
        }

        let name = config.name.clone();
        let path = self.data_dir.join(&name);
        let collection = Arc::new(Collection::create(path, config, &self.config)?);
        collections.insert(name, Arc::clone(&collection));
        Ok(collection)
    }

    /// Returns a collection by name.
    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// Lists all collection names, sorted.
    #[must_use]
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Deletes a collection, releasing its files and in-memory state.
    ///
    /// # Errors
    ///
    /// [`Error::CollectionNotFound`] for an unknown name; IO errors when
    /// removing the directory.
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        let collection = self
            .collections
            .write()
            .remove(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;
        drop(collection); // flushes and joins io workers

        let path = self.data_dir.join(name);
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        info!(name, "deleted collection");
        Ok(())
    }

    /// Flushes every collection.
    ///
    /// # Errors
    ///
    /// Surfaces the first flush failure.
    pub fn close(&self) -> Result<()> {
        let collections = self.collections.read();
        for collection in collections.values() {
            collection.close()?;
        }
        Ok(())
    }
}
