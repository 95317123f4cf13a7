//! Distance metrics for vector similarity.
//!
//! Every kernel returns a score where **lower means closer**, so ranking
//! code never branches on the metric:
//!
//! - cosine: `1 - cos(a, b)`, in `[0, 2]`
//! - euclidean: `sqrt(sum((a - b)^2))`
//! - dot product: `-(a . b)` (negated so smaller = more similar)
//! - manhattan: `sum(|a - b|)`

use crate::error::{Error, Result};
use crate::simd;
use serde::{Deserialize, Serialize};

/// Sentinel returned by the cosine kernel when either vector has zero norm.
///
/// 2.0 is the maximum cosine distance; returning it instead of NaN keeps
/// zero vectors rankable (last) without poisoning comparisons.
pub const MAX_COSINE_DISTANCE: f32 = 2.0;

/// Distance metric for vector similarity calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine distance (1 - cosine similarity).
    /// Best for normalized vectors, commonly used with text embeddings.
    #[default]
    Cosine,

    /// Euclidean distance (L2 norm).
    /// Best for spatial data and when magnitude matters.
    Euclidean,

    /// Negated dot product (inner product).
    /// Best for maximum inner product search.
    DotProduct,

    /// Manhattan distance (L1 norm).
    Manhattan,
}

impl DistanceMetric {
    /// Calculates the distance between two vectors, validating inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if either vector is empty and
    /// [`Error::DimensionMismatch`] if the lengths differ.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.is_empty() || b.is_empty() {
            return Err(Error::InvalidArgument(
                "distance requires non-empty vectors".to_string(),
            ));
        }
        if a.len() != b.len() {
            return Err(Error::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }
        Ok(self.score(a, b))
    }

    /// Calculates the distance without validation.
    ///
    /// Hot-path variant for callers that validated dimensions once. Equal
    /// non-empty lengths are assumed; violating that yields a meaningless
    /// score over the shorter prefix.
    #[inline]
    #[must_use]
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => simd::cosine_distance(a, b),
            Self::Euclidean => simd::euclidean_distance(a, b),
            Self::DotProduct => -simd::dot_product(a, b),
            Self::Manhattan => simd::manhattan_distance(a, b),
        }
    }

    /// Returns the lowercase name used in configs and on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::DotProduct => "dot_product",
            Self::Manhattan => "manhattan",
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            "dot_product" | "dot" => Ok(Self::DotProduct),
            "manhattan" => Ok(Self::Manhattan),
            other => Err(Error::InvalidArgument(format!(
                "unknown distance metric '{other}'"
            ))),
        }
    }
}
