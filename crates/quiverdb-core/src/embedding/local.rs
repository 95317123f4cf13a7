//! Deterministic feature-hashing embedder.
//!
//! Hashes lowercase word tokens into dimension buckets with a sign bit and
//! L2-normalizes the result. Not a semantic model: its purpose is a fully
//! offline, reproducible vectorizer for tests and air-gapped setups, where
//! "similar token multisets" is an acceptable notion of similarity.

use crate::error::Result;
use crate::simd;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

use super::Vectorizer;

/// Feature-hashing embedder.
pub struct LocalHashVectorizer {
    dimension: usize,
    model_name: String,
}

impl LocalHashVectorizer {
    /// Creates an embedder producing `dimension`-length unit vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_name: format!("feature-hash-{dimension}"),
        }
    }
}

impl Vectorizer for LocalHashVectorizer {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = FxHasher::default();
            token.to_lowercase().hash(&mut hasher);
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        simd::normalize_inplace(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
