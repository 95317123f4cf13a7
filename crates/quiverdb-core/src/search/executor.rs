//! Parallel search executor.
//!
//! Decides between a sequential scan (small collections) and a sharded
//! parallel scan: the record slice is split into exactly `workers`
//! contiguous shards (the last may be shorter), each worker scores and
//! filters its shard and keeps a local top list, and the executor merges,
//! sorts ascending, and applies offset and limit.
//!
//! Workers check the cancel token between candidates; on cancellation the
//! partial results are discarded and the request fails with `Cancelled`.
//! Observed latency feeds an exponential moving average.

use crate::cancel::CancelToken;
use crate::config::{SearchConfig, SimdConfig};
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::record::SearchRequest;
use crate::embedding::Vectorizer;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::trace;

/// Smoothing factor for the latency EMA.
const EMA_ALPHA: f64 = 0.2;

/// A borrowed view of one stored record for scanning.
pub type ScanEntry<'a> = (&'a str, &'a [f32], Option<&'a JsonValue>);

/// Sequential-vs-parallel scan executor.
pub struct SearchExecutor {
    parallel_enabled: bool,
    workers: usize,
    batch_size: usize,
    simd: SimdConfig,
    /// EMA of observed scan latency in milliseconds, stored as f64 bits.
    latency_ema: AtomicU64,
}

impl SearchExecutor {
    /// Creates an executor from the search and SIMD config sections.
    #[must_use]
    pub fn new(search: &SearchConfig, simd: SimdConfig) -> Self {
        Self {
            parallel_enabled: search.parallel_enabled,
            workers: search.effective_workers().max(1),
            batch_size: search.batch_size.max(1),
            simd,
            latency_ema: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Average observed scan latency.
    #[must_use]
    pub fn average_latency(&self) -> std::time::Duration {
        let ms = f64::from_bits(self.latency_ema.load(Ordering::Relaxed));
        std::time::Duration::from_secs_f64((ms / 1000.0).max(0.0))
    }

    /// Scans `records` for the request's nearest neighbors.
    ///
    /// Returns (id, score) pairs, ascending, with offset and limit
    /// applied.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero limit, `Cancelled` when the token
    /// fires mid-scan.
    pub fn execute(
        &self,
        request: &SearchRequest,
        metric: DistanceMetric,
        records: &[ScanEntry<'_>],
        cancel: &CancelToken,
    ) -> Result<Vec<(String, f32)>> {
        if request.limit == 0 {
            return Err(Error::InvalidArgument(
                "search limit must be positive".to_string(),
            ));
        }
        cancel.checkpoint()?;

        let start = Instant::now();
        let take = request.offset + request.limit;

        let parallel =
            self.parallel_enabled && records.len() > self.workers * self.batch_size;

        let mut merged: Vec<(usize, f32)> = if parallel {
            self.parallel_scan(request, metric, records, take, cancel)?
        } else {
            scan_shard(
                request,
                metric,
                records,
                0,
                take,
                &self.simd,
                cancel,
            )?
        };

        merged.sort_by(|a, b| a.1.total_cmp(&b.1));

        let page: Vec<(String, f32)> = merged
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|(idx, score)| (records[idx].0.to_string(), score))
            .collect();

        self.record_latency(start.elapsed());
        trace!(
            candidates = records.len(),
            parallel,
            results = page.len(),
            "scan complete"
        );
        Ok(page)
    }

    /// Vectorizes `query` and scans with the resulting vector.
    ///
    /// # Errors
    ///
    /// Propagates provider failures and scan errors.
    pub fn execute_text(
        &self,
        vectorizer: &dyn Vectorizer,
        query: &str,
        template: &SearchRequest,
        metric: DistanceMetric,
        records: &[ScanEntry<'_>],
        cancel: &CancelToken,
    ) -> Result<Vec<(String, f32)>> {
        let vector = vectorizer.embed(query)?;
        let request = SearchRequest {
            vector,
            ..template.clone()
        };
        self.execute(&request, metric, records, cancel)
    }

    /// Splits records into exactly `workers` contiguous shards.
    fn parallel_scan(
        &self,
        request: &SearchRequest,
        metric: DistanceMetric,
        records: &[ScanEntry<'_>],
        take: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<(usize, f32)>> {
        let shard_size = records.len().div_ceil(self.workers);

        let outcomes: Vec<Result<Vec<(usize, f32)>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.workers)
                .map(|worker| {
                    let start = worker * shard_size;
                    let end = ((worker + 1) * shard_size).min(records.len());
                    let shard = if start < end {
                        &records[start..end]
                    } else {
                        &[]
                    };
                    let simd = &self.simd;
                    scope.spawn(move || {
                        scan_shard(request, metric, shard, start, take, simd, cancel)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(Error::Storage("scan worker panicked".to_string())))
                })
                .collect()
        });

        let mut merged = Vec::with_capacity(take * self.workers);
        for outcome in outcomes {
            merged.extend(outcome?);
        }
        Ok(merged)
    }

    fn record_latency(&self, elapsed: std::time::Duration) {
        let observed_ms = elapsed.as_secs_f64() * 1000.0;
        let mut current = self.latency_ema.load(Ordering::Relaxed);
        loop {
            let previous = f64::from_bits(current);
            let next = if previous == 0.0 {
                observed_ms
            } else {
                EMA_ALPHA * observed_ms + (1.0 - EMA_ALPHA) * previous
            };
            match self.latency_ema.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Scores one contiguous shard, returning global indices of the local
/// top `take` candidates that pass the filter.
fn scan_shard(
    request: &SearchRequest,
    metric: DistanceMetric,
    shard: &[ScanEntry<'_>],
    base: usize,
    take: usize,
    simd: &SimdConfig,
    cancel: &CancelToken,
) -> Result<Vec<(usize, f32)>> {
    let mut matches: Vec<(usize, f32)> = Vec::new();

    for (offset, &(_, vector, metadata)) in shard.iter().enumerate() {
        cancel.checkpoint()?;

        if let Some(filter) = &request.filter {
            if !filter.matches(metadata) {
                continue;
            }
        }

        let score = if simd.enabled {
            metric.score(&request.vector, vector)
        } else {
            crate::simd::scalar_score(metric, &request.vector, vector)
        };
        matches.push((base + offset, score));
    }

    matches.sort_by(|a, b| a.1.total_cmp(&b.1));
    matches.truncate(take);
    Ok(matches)
}
