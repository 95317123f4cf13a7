//! HNSW (Hierarchical Navigable Small World) index.
//!
//! Approximate k-nearest-neighbor search in expected logarithmic time.
//! The graph lives in [`graph`]; [`HnswIndex`] adds the external string-id
//! mapping and the [`VectorIndex`] surface.
//!
//! # Module organization
//!
//! - `params`: tunable graph parameters
//! - `graph`: arena, layers, insert/search/delete machinery
//! - `persistence`: CRC-checked snapshot save/load

mod graph;
mod params;
mod persistence;

#[cfg(test)]
mod graph_tests;
#[cfg(test)]
mod params_tests;

pub use params::HnswParams;
pub(crate) use persistence::SNAPSHOT_FILE;

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::info;

use super::{IndexKind, IndexStats, VectorIndex};
use graph::{HnswGraph, NodeId};

/// Tombstone share that triggers a rebuild from `maybe_optimize`.
pub(crate) const OPTIMIZE_TOMBSTONE_RATIO: f64 = 0.3;

/// HNSW index over string-identified vectors.
pub struct HnswIndex {
    dimension: usize,
    graph: HnswGraph,
    id_map: RwLock<FxHashMap<String, NodeId>>,
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex").finish_non_exhaustive()
    }
}

impl HnswIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(dimension: usize, metric: DistanceMetric, params: HnswParams) -> Self {
        Self {
            dimension,
            graph: HnswGraph::new(metric, params),
            id_map: RwLock::new(FxHashMap::default()),
        }
    }

    /// Restores an index from a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexCorrupted`] on magic, version, CRC, or
    /// invariant failures.
    pub fn load(path: &Path) -> Result<Self> {
        let (dimension, graph, live_ids) = persistence::load_graph(path)?;
        let mut id_map = FxHashMap::default();
        id_map.reserve(live_ids.len());
        for (id, slot) in live_ids {
            if id_map.insert(id.clone(), slot).is_some() {
                return Err(Error::IndexCorrupted(format!(
                    "hnsw snapshot contains duplicate id '{id}'"
                )));
            }
        }
        Ok(Self {
            dimension,
            graph,
            id_map: RwLock::new(id_map),
        })
    }

    /// Returns the distance metric this index scores with.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.graph.metric
    }

    /// Search with an explicit `ef` override.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for `k == 0`, `DimensionMismatch` for a
    /// wrong-length query.
    pub fn search_with_ef(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<(String, f32)>> {
        if k == 0 {
            return Err(Error::InvalidArgument(
                "search limit must be positive".to_string(),
            ));
        }
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let hits = self.graph.search(query, k, ef);
        let nodes = self.graph.nodes.read();
        Ok(hits
            .into_iter()
            .map(|(slot, score)| (nodes[slot].id.clone(), score))
            .collect())
    }

    /// Rebuilds the graph when the tombstone share crosses
    /// [`OPTIMIZE_TOMBSTONE_RATIO`].
    ///
    /// # Errors
    ///
    /// Surfaces rebuild failures from [`VectorIndex::optimize`].
    #[allow(clippy::cast_precision_loss)]
    pub fn maybe_optimize(&self) -> Result<bool> {
        let live = self.graph.live_len();
        let dead = self.graph.deleted_len();
        let total = live + dead;
        if total == 0 || (dead as f64) / (total as f64) <= OPTIMIZE_TOMBSTONE_RATIO {
            return Ok(false);
        }
        self.optimize()?;
        Ok(true)
    }
}

impl VectorIndex for HnswIndex {
    fn build(&self, records: &[(String, Vec<f32>)]) -> Result<()> {
        if !self.is_empty() {
            return Err(Error::InvalidArgument(
                "build requires an empty index".to_string(),
            ));
        }
        for (id, vector) in records {
            self.add(id, vector)?;
        }
        Ok(())
    }

    fn add(&self, id: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        {
            let id_map = self.id_map.read();
            if id_map.contains_key(id) {
                return Err(Error::DuplicateId(id.to_string()));
            }
        }

        let slot = self.graph.insert(id.to_string(), vector.to_vec());
        self.id_map.write().insert(id.to_string(), slot);
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        let Some(slot) = self.id_map.write().remove(id) else {
            return Err(Error::VectorNotFound(id.to_string()));
        };
        self.graph.mark_deleted(slot);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let ef = self.graph.params.ef_search;
        self.search_with_ef(query, k, ef)
    }

    fn len(&self) -> usize {
        self.graph.live_len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Hnsw
    }

    fn optimize(&self) -> Result<()> {
        // Rebuild from live nodes into a fresh arena, then swap contents.
        let live: Vec<(String, Vec<f32>)> = {
            let nodes = self.graph.nodes.read();
            nodes
                .iter()
                .filter(|n| !n.deleted)
                .map(|n| (n.id.clone(), n.vector.clone()))
                .collect()
        };

        info!(live = live.len(), "rebuilding hnsw graph");

        let fresh = HnswGraph::new(self.graph.metric, self.graph.params.clone());
        let mut fresh_map = FxHashMap::default();
        fresh_map.reserve(live.len());
        for (id, vector) in live {
            let slot = fresh.insert(id.clone(), vector);
            fresh_map.insert(id, slot);
        }

        // Swap the id map first so concurrent readers never observe slots
        // from the old arena paired with the new graph.
        let mut id_map = self.id_map.write();
        self.graph.replace_with(fresh);
        *id_map = fresh_map;
        Ok(())
    }

    fn stats(&self) -> IndexStats {
        let nodes = self.graph.nodes.read();
        let bytes = nodes
            .iter()
            .map(|n| n.id.len() + n.vector.len() * std::mem::size_of::<f32>())
            .sum::<usize>();
        IndexStats {
            kind: IndexKind::Hnsw,
            len: self.graph.live_len(),
            deleted: self.graph.deleted_len(),
            dimension: self.dimension,
            bytes_estimate: bytes,
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        persistence::save_graph(path, self.dimension, &self.graph)
    }
}
