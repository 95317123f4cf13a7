//! Flat (exhaustive scan) index.
//!
//! Baseline and fallback: stores an appendable array of vectors and scores
//! every entry on each query. Exact results, O(n) per search. Deletion is
//! a swap-remove, so insertion order is not preserved.

use crate::config::SimdConfig;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::simd;
use crate::util::crc32;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

use super::{IndexKind, IndexStats, VectorIndex};

/// Snapshot file name inside a collection directory.
pub(crate) const SNAPSHOT_FILE: &str = "flat.idx";

const SNAPSHOT_MAGIC: &[u8; 4] = b"QVRF";
const SNAPSHOT_VERSION: u16 = 1;

/// Summary statistics embedded in the snapshot document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlatStats {
    /// Number of stored vectors.
    pub count: usize,
    /// Smallest vector norm.
    pub min_norm: f32,
    /// Largest vector norm.
    pub max_norm: f32,
}

/// Self-describing cold-start snapshot.
#[derive(Serialize, Deserialize)]
struct FlatSnapshot {
    dimension: usize,
    metric: DistanceMetric,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    stats: FlatStats,
}

#[derive(Default)]
struct FlatInner {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    id_to_slot: FxHashMap<String, usize>,
}

/// Exhaustive-scan index over an appendable vector array.
pub struct FlatIndex {
    dimension: usize,
    metric: DistanceMetric,
    simd: SimdConfig,
    inner: RwLock<FlatInner>,
}

impl std::fmt::Debug for FlatIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatIndex").finish_non_exhaustive()
    }
}

impl FlatIndex {
    /// Creates an empty flat index.
    #[must_use]
    pub fn new(dimension: usize, metric: DistanceMetric, simd: SimdConfig) -> Self {
        Self {
            dimension,
            metric,
            simd,
            inner: RwLock::new(FlatInner::default()),
        }
    }

    /// Restores an index from a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexCorrupted`] on bad magic, version, or CRC.
    pub fn load(path: &Path, simd: SimdConfig) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut header = [0u8; 6];
        file.read_exact(&mut header)
            .map_err(|_| Error::IndexCorrupted("flat snapshot too short".to_string()))?;

        if &header[0..4] != SNAPSHOT_MAGIC {
            return Err(Error::IndexCorrupted(
                "flat snapshot has wrong magic".to_string(),
            ));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != SNAPSHOT_VERSION {
            return Err(Error::IndexCorrupted(format!(
                "unsupported flat snapshot version {version}"
            )));
        }

        let mut rest = Vec::new();
        file.read_to_end(&mut rest)?;
        if rest.len() < 4 {
            return Err(Error::IndexCorrupted("flat snapshot truncated".to_string()));
        }
        let body = &rest[..rest.len() - 4];
        let stored_crc = u32::from_le_bytes(rest[rest.len() - 4..].try_into().unwrap_or([0; 4]));
        if crc32(body) != stored_crc {
            return Err(Error::IndexCorrupted(
                "flat snapshot CRC mismatch".to_string(),
            ));
        }

        let snapshot: FlatSnapshot = bincode::deserialize(body)?;
        if snapshot.ids.len() != snapshot.vectors.len() {
            return Err(Error::IndexCorrupted(
                "flat snapshot id/vector count mismatch".to_string(),
            ));
        }

        let mut id_to_slot = FxHashMap::default();
        id_to_slot.reserve(snapshot.ids.len());
        for (slot, id) in snapshot.ids.iter().enumerate() {
            if id_to_slot.insert(id.clone(), slot).is_some() {
                return Err(Error::IndexCorrupted(format!(
                    "flat snapshot contains duplicate id '{id}'"
                )));
            }
        }

        Ok(Self {
            dimension: snapshot.dimension,
            metric: snapshot.metric,
            simd,
            inner: RwLock::new(FlatInner {
                ids: snapshot.ids,
                vectors: snapshot.vectors,
                id_to_slot,
            }),
        })
    }

    /// Returns the distance metric this index scores with.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Scores every entry, sorts ascending, then applies `offset` and
    /// `limit`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for `limit == 0`, `DimensionMismatch` for a
    /// wrong-length query.
    pub fn search_with_offset(
        &self,
        query: &[f32],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<(String, f32)>> {
        if limit == 0 {
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

        let inner = self.inner.read();
        let scores = simd::batch_scores(self.metric, query, &inner.vectors, &self.simd);

        let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(ranked
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(slot, score)| (inner.ids[slot].clone(), score))
            .collect())
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn build(&self, records: &[(String, Vec<f32>)]) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.ids.is_empty() {
            return Err(Error::InvalidArgument(
                "build requires an empty index".to_string(),
            ));
        }

        for (id, vector) in records {
            self.check_vector(vector)?;
            if inner.id_to_slot.contains_key(id) {
                return Err(Error::DuplicateId(id.clone()));
            }
            let slot = inner.ids.len();
            inner.id_to_slot.insert(id.clone(), slot);
            inner.ids.push(id.clone());
            inner.vectors.push(vector.clone());
        }
        Ok(())
    }

    fn add(&self, id: &str, vector: &[f32]) -> Result<()> {
        self.check_vector(vector)?;
        let mut inner = self.inner.write();
        if inner.id_to_slot.contains_key(id) {
            return Err(Error::DuplicateId(id.to_string()));
        }
        let slot = inner.ids.len();
        inner.id_to_slot.insert(id.to_string(), slot);
        inner.ids.push(id.to_string());
        inner.vectors.push(vector.to_vec());
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(slot) = inner.id_to_slot.remove(id) else {
            return Err(Error::VectorNotFound(id.to_string()));
        };

        inner.ids.swap_remove(slot);
        inner.vectors.swap_remove(slot);

        // The former tail now lives at `slot`; repoint its map entry.
        if slot < inner.ids.len() {
            let moved = inner.ids[slot].clone();
            inner.id_to_slot.insert(moved, slot);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        self.search_with_offset(query, k, 0)
    }

    fn len(&self) -> usize {
        self.inner.read().ids.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn optimize(&self) -> Result<()> {
        // Nothing to reclaim: swap-remove keeps the array dense.
        Ok(())
    }

    fn stats(&self) -> IndexStats {
        let inner = self.inner.read();
        let bytes = inner.ids.iter().map(String::len).sum::<usize>()
            + inner.vectors.len() * self.dimension * std::mem::size_of::<f32>();
        IndexStats {
            kind: IndexKind::Flat,
            len: inner.ids.len(),
            deleted: 0,
            dimension: self.dimension,
            bytes_estimate: bytes,
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        let inner = self.inner.read();

        let norms: Vec<f32> = inner.vectors.iter().map(|v| simd::norm(v)).collect();
        let stats = FlatStats {
            count: inner.ids.len(),
            min_norm: norms.iter().copied().fold(f32::INFINITY, f32::min),
            max_norm: norms.iter().copied().fold(0.0, f32::max),
        };

        let snapshot = FlatSnapshot {
            dimension: self.dimension,
            metric: self.metric,
            ids: inner.ids.clone(),
            vectors: inner.vectors.clone(),
            stats,
        };
        let body = bincode::serialize(&snapshot)?;

        let tmp = path.join(format!("{SNAPSHOT_FILE}.tmp"));
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(SNAPSHOT_MAGIC)?;
        file.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
        file.write_all(&body)?;
        file.write_all(&crc32(&body).to_le_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp, path.join(SNAPSHOT_FILE))?;
        Ok(())
    }
}
