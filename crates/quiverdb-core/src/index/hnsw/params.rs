//! HNSW index parameters.

use serde::{Deserialize, Serialize};

/// Tunable parameters of the HNSW graph.
///
/// Higher `m`/`ef_construction` improve recall at the cost of memory and
/// build time; `ef_search` trades query latency for recall at search time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Bi-directional links per node at layers above 0 (M).
    pub m: usize,
    /// Links per node at layer 0 (M0, conventionally 2×M).
    pub m0: usize,
    /// Candidate pool breadth during construction.
    pub ef_construction: usize,
    /// Candidate pool breadth during search.
    pub ef_search: usize,
    /// PRNG seed for layer assignment; fixed seed = reproducible graphs.
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            m0: 32,
            ef_construction: 200,
            ef_search: 50,
            seed: 0x5DEE_CE66_D1A4_B5B5,
        }
    }
}

impl HnswParams {
    /// Creates parameters with the given `m` and `ef_construction`;
    /// `m0` is derived as `2 * m`.
    #[must_use]
    pub fn custom(m: usize, ef_construction: usize) -> Self {
        Self {
            m: m.max(2),
            m0: m.max(2) * 2,
            ef_construction,
            ..Self::default()
        }
    }

    /// Parameters tuned for insertion speed over recall.
    #[must_use]
    pub fn fast() -> Self {
        Self::custom(8, 100)
    }

    /// Parameters tuned for recall over build speed.
    #[must_use]
    pub fn high_recall() -> Self {
        let mut params = Self::custom(32, 400);
        params.ef_search = 128;
        params
    }

    /// Replaces the layer-assignment seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Level multiplier for geometric layer sampling: `1 / ln(m)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn level_mult(&self) -> f64 {
        1.0 / (self.m.max(2) as f64).ln()
    }
}
