//! SIMD-accelerated vector kernels.
//!
//! Explicit 8-wide f32 lanes via the `wide` crate, with scalar remainders.
//! `wide` lowers to AVX2/SSE on `x86_64`, NEON on `aarch64`, SIMD128 on
//! WASM, and plain scalar code elsewhere; no feature detection is needed
//! here.
//!
//! Batch entry points optionally shard their work across rayon when the
//! caller's [`SimdConfig`](crate::config::SimdConfig) enables parallel
//! chunks.

use crate::config::SimdConfig;
use crate::distance::{DistanceMetric, MAX_COSINE_DISTANCE};
use rayon::prelude::*;
use wide::f32x8;

/// Computes the dot product of two equal-length vectors.
#[inline]
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let simd_len = len / 8;

    let mut sum = f32x8::ZERO;
    for i in 0..simd_len {
        let offset = i * 8;
        let va = f32x8::from(&a[offset..offset + 8]);
        let vb = f32x8::from(&b[offset..offset + 8]);
        sum = va.mul_add(vb, sum);
    }

    let mut result = sum.reduce_add();
    for i in simd_len * 8..len {
        result += a[i] * b[i];
    }
    result
}

/// Computes the squared L2 distance (no sqrt, for ranking-only callers).
#[inline]
#[must_use]
pub fn squared_l2_distance(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let simd_len = len / 8;

    let mut sum = f32x8::ZERO;
    for i in 0..simd_len {
        let offset = i * 8;
        let va = f32x8::from(&a[offset..offset + 8]);
        let vb = f32x8::from(&b[offset..offset + 8]);
        let diff = va - vb;
        sum = diff.mul_add(diff, sum);
    }

    let mut result = sum.reduce_add();
    for i in simd_len * 8..len {
        let diff = a[i] - b[i];
        result += diff * diff;
    }
    result
}

/// Computes the euclidean (L2) distance.
#[inline]
#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    squared_l2_distance(a, b).sqrt()
}

/// Computes the manhattan (L1) distance.
#[inline]
#[must_use]
pub fn manhattan_distance(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let simd_len = len / 8;

    let mut sum = f32x8::ZERO;
    for i in 0..simd_len {
        let offset = i * 8;
        let va = f32x8::from(&a[offset..offset + 8]);
        let vb = f32x8::from(&b[offset..offset + 8]);
        sum += (va - vb).abs();
    }

    let mut result = sum.reduce_add();
    for i in simd_len * 8..len {
        result += (a[i] - b[i]).abs();
    }
    result
}

/// Computes the cosine distance `1 - cos(a, b)` in a single fused pass.
///
/// dot(a,b), |a|² and |b|² accumulate together so each input is read once.
/// A zero-norm input yields [`MAX_COSINE_DISTANCE`] instead of NaN.
#[inline]
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let simd_len = len / 8;

    let mut dot = f32x8::ZERO;
    let mut norm_a = f32x8::ZERO;
    let mut norm_b = f32x8::ZERO;

    for i in 0..simd_len {
        let offset = i * 8;
        let va = f32x8::from(&a[offset..offset + 8]);
        let vb = f32x8::from(&b[offset..offset + 8]);
        dot = va.mul_add(vb, dot);
        norm_a = va.mul_add(va, norm_a);
        norm_b = vb.mul_add(vb, norm_b);
    }

    let mut dot_sum = dot.reduce_add();
    let mut norm_a_sum = norm_a.reduce_add();
    let mut norm_b_sum = norm_b.reduce_add();

    for i in simd_len * 8..len {
        dot_sum += a[i] * b[i];
        norm_a_sum += a[i] * a[i];
        norm_b_sum += b[i] * b[i];
    }

    let denom = norm_a_sum.sqrt() * norm_b_sum.sqrt();
    if denom == 0.0 {
        return MAX_COSINE_DISTANCE;
    }

    // Clamp against floating error so identical vectors report exactly 0.
    1.0 - (dot_sum / denom).clamp(-1.0, 1.0)
}

/// Computes the L2 norm (magnitude) of a vector.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    let simd_len = v.len() / 8;
    let mut sum = f32x8::ZERO;
    for i in 0..simd_len {
        let offset = i * 8;
        let lane = f32x8::from(&v[offset..offset + 8]);
        sum = lane.mul_add(lane, sum);
    }
    let mut result = sum.reduce_add();
    for x in &v[simd_len * 8..] {
        result += x * x;
    }
    result.sqrt()
}

/// Rescales a vector to unit length in place.
///
/// A zero vector is left unchanged.
#[inline]
pub fn normalize_inplace(v: &mut [f32]) {
    let n = norm(v);
    if n == 0.0 {
        return;
    }
    let inv = 1.0 / n;
    for x in v.iter_mut() {
        *x *= inv;
    }
}

/// Normalizes a batch of vectors, in parallel chunks when enabled.
pub fn normalize_batch(vectors: &mut [Vec<f32>], config: &SimdConfig) {
    if config.parallel_chunks && vectors.len() >= config.chunk_size.max(2) {
        vectors
            .par_chunks_mut(config.chunk_size.max(1))
            .for_each(|chunk| {
                for v in chunk {
                    normalize_inplace(v);
                }
            });
    } else {
        for v in vectors.iter_mut() {
            normalize_inplace(v);
        }
    }
}

/// Scores a query against a slice of candidates, returning a parallel slice
/// of lower-is-closer scores.
///
/// Uses rayon chunking when the config enables it and the candidate count
/// warrants the fan-out; falls back to a straight loop otherwise.
#[must_use]
pub fn batch_scores(
    metric: DistanceMetric,
    query: &[f32],
    candidates: &[Vec<f32>],
    config: &SimdConfig,
) -> Vec<f32> {
    if !config.enabled {
        return candidates
            .iter()
            .map(|c| scalar_score(metric, query, c))
            .collect();
    }

    if config.parallel_chunks && candidates.len() > config.chunk_size.max(1) {
        candidates
            .par_chunks(config.chunk_size.max(1))
            .flat_map_iter(|chunk| {
                chunk
                    .iter()
                    .map(|c| metric.score(query, c))
                    .collect::<Vec<_>>()
            })
            .collect()
    } else {
        candidates.iter().map(|c| metric.score(query, c)).collect()
    }
}

/// Scalar reference kernels, used when SIMD is disabled and by tests as
/// ground truth.
#[must_use]
pub fn scalar_score(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if na == 0.0 || nb == 0.0 {
                MAX_COSINE_DISTANCE
            } else {
                1.0 - (dot / (na * nb)).clamp(-1.0, 1.0)
            }
        }
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
        DistanceMetric::DotProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        DistanceMetric::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
    }
}
