//! Vector indexes: exhaustive flat scan and HNSW proximity graph.
//!
//! Both variants implement [`VectorIndex`]; collections hold a boxed trait
//! object chosen by [`IndexKind`]. The [`open_index`] factory restores an
//! index from its on-disk snapshot when one exists.

mod flat;
pub mod hnsw;


pub use flat::FlatIndex;
pub use hnsw::{HnswIndex, HnswParams};

use crate::config::SimdConfig;
use crate::distance::DistanceMetric;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Index variant selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Exhaustive scan over all vectors; exact, O(n) per query.
    #[default]
    Flat,
    /// Hierarchical navigable small world graph; approximate,
    /// expected-logarithmic per query.
    Hnsw,
}

impl IndexKind {
    /// Returns the lowercase name used in configs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Hnsw => "hnsw",
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable index counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Index variant.
    pub kind: IndexKind,
    /// Live (non-deleted) entries.
    pub len: usize,
    /// Soft-deleted entries awaiting `optimize`.
    pub deleted: usize,
    /// Vector dimension.
    pub dimension: usize,
    /// Rough in-memory footprint in bytes.
    pub bytes_estimate: usize,
}

/// Capability surface shared by all index variants.
pub trait VectorIndex: Send + Sync {
    /// Bulk-loads an initial batch into an empty index.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` for any wrong-length vector, `DuplicateId` for
    /// repeated ids.
    fn build(&self, records: &[(String, Vec<f32>)]) -> Result<()>;

    /// Adds a single vector.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` or `DuplicateId`.
    fn add(&self, id: &str, vector: &[f32]) -> Result<()>;

    /// Removes a vector by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is absent.
    fn remove(&self, id: &str) -> Result<()>;

    /// Returns the `k` nearest ids with lower-is-closer scores, ascending.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for `k == 0`, `DimensionMismatch` for a
    /// wrong-length query.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>>;

    /// Number of live entries.
    fn len(&self) -> usize;

    /// Returns true if the index holds no live entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured vector dimension.
    fn dimension(&self) -> usize;

    /// Which variant this is.
    fn kind(&self) -> IndexKind;

    /// Reclaims space left by deletions and rebuilds invariants.
    ///
    /// # Errors
    ///
    /// Surfaces internal rebuild failures.
    fn optimize(&self) -> Result<()>;

    /// Observable counters.
    fn stats(&self) -> IndexStats;

    /// Persists a snapshot into `path` (a collection directory).
    ///
    /// # Errors
    ///
    /// Surfaces IO and serialization failures.
    fn save(&self, path: &Path) -> Result<()>;
}

/// Creates an empty index of the requested kind.
#[must_use]
pub fn create_index(
    kind: IndexKind,
    dimension: usize,
    metric: DistanceMetric,
    params: &HnswParams,
    simd: &SimdConfig,
) -> Box<dyn VectorIndex> {
    match kind {
        IndexKind::Flat => Box::new(FlatIndex::new(dimension, metric, simd.clone())),
        IndexKind::Hnsw => Box::new(HnswIndex::new(dimension, metric, params.clone())),
    }
}

/// Opens an index from a collection directory, restoring the snapshot when
/// present and starting empty otherwise.
///
/// # Errors
///
/// Returns [`crate::error::Error::IndexCorrupted`] when a snapshot exists
/// but fails integrity validation.
pub fn open_index(
    kind: IndexKind,
    path: &Path,
    dimension: usize,
    metric: DistanceMetric,
    params: &HnswParams,
    simd: &SimdConfig,
) -> Result<Box<dyn VectorIndex>> {
    match kind {
        IndexKind::Flat => {
            let snapshot = path.join(flat::SNAPSHOT_FILE);
            if snapshot.exists() {
                Ok(Box::new(FlatIndex::load(&snapshot, simd.clone())?))
            } else {
                Ok(Box::new(FlatIndex::new(dimension, metric, simd.clone())))
            }
        }
        IndexKind::Hnsw => {
            let snapshot = path.join(hnsw::SNAPSHOT_FILE);
            if snapshot.exists() {
                Ok(Box::new(HnswIndex::load(&snapshot)?))
            } else {
                Ok(Box::new(HnswIndex::new(dimension, metric, params.clone())))
            }
        }
    }
}
