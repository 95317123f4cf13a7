//! Batch embedding pipeline with graceful degradation.
//!
//! Three tiers, cheapest first:
//!
//! 1. full-batch provider call, retried with a delay;
//! 2. fallback-sized slices dispatched in parallel, each with its own
//!    retry budget;
//! 3. per-item calls for any slice that still fails.
//!
//! Results come back in input order. Failed items are dropped (`None` in
//! the aligned output); a provider error surfaces only when every single
//! item failed. The pipeline itself never panics.

use crate::cancel::CancelToken;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::Vectorizer;

/// Pipeline outcome counters.
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    /// Texts that produced an embedding.
    pub successful_texts: usize,
    /// Texts dropped after every tier failed.
    pub failed_texts: usize,
    /// Full batches that succeeded on the primary path.
    pub batches_processed: usize,
    /// Batches that degraded to the fallback tiers.
    pub fallbacks_used: usize,
    /// Total provider-call retries across all tiers.
    pub retries_used: usize,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
    /// Successful texts per second.
    pub throughput: f64,
}

/// Wraps a [`Vectorizer`] with adaptive batching.
pub struct BatchEmbedder {
    provider: Arc<dyn Vectorizer>,
    config: EmbeddingConfig,
    pool: rayon::ThreadPool,
}

impl BatchEmbedder {
    /// Creates a pipeline over `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the worker pool cannot be built.
    pub fn new(provider: Arc<dyn Vectorizer>, config: EmbeddingConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_workers.max(1))
            .thread_name(|i| format!("quiver-embed-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("embedding worker pool: {e}")))?;
        Ok(Self {
            provider,
            config,
            pool,
        })
    }

    /// The wrapped provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn Vectorizer> {
        &self.provider
    }

    /// Embeds `texts`, returning per-input results in input order plus
    /// run statistics.
    ///
    /// # Errors
    ///
    /// `Cancelled` when the token fires; [`Error::Provider`] only when
    /// every item failed.
    #[allow(clippy::cast_precision_loss)]
    pub fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancelToken,
    ) -> Result<(Vec<Option<Vec<f32>>>, BatchStats)> {
        let start = Instant::now();
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

        let retries = AtomicUsize::new(0);
        let mut batches_processed = 0usize;
        let mut fallbacks_used = 0usize;
        let mut last_error: Option<Error> = None;

        let batch_size = self.config.batch_size.max(1);
        for (chunk_idx, chunk) in texts.chunks(batch_size).enumerate() {
            cancel.checkpoint()?;
            let base = chunk_idx * batch_size;

            match self.call_with_retries(chunk, cancel, &retries) {
                Ok(vectors) => {
                    for (offset, vector) in vectors.into_iter().enumerate() {
                        results[base + offset] = Some(vector);
                    }
                    batches_processed += 1;
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) if self.config.fallback_enabled => {
                    warn!(error = %err, "full batch failed, degrading to fallback slices");
                    fallbacks_used += 1;
                    last_error = Some(err);
                    self.fallback_chunk(chunk, base, &mut results, cancel, &retries)?;
                }
                Err(err) => {
                    warn!(error = %err, "full batch failed and fallback is disabled");
                    last_error = Some(err);
                }
            }
        }

        let successful_texts = results.iter().filter(|r| r.is_some()).count();
        let failed_texts = texts.len() - successful_texts;

        if !texts.is_empty() && successful_texts == 0 {
            let err = last_error
                .unwrap_or_else(|| Error::Provider("every embedding failed".to_string()));
            return Err(err);
        }

        let elapsed = start.elapsed();
        let stats = BatchStats {
            successful_texts,
            failed_texts,
            batches_processed,
            fallbacks_used,
            retries_used: retries.load(Ordering::Relaxed),
            elapsed,
            throughput: if elapsed.as_secs_f64() > 0.0 {
                successful_texts as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            },
        };

        debug!(
            successful = stats.successful_texts,
            failed = stats.failed_texts,
            fallbacks = stats.fallbacks_used,
            retries = stats.retries_used,
            "embedding batch complete"
        );
        Ok((results, stats))
    }

    /// Tier 2 and 3: fallback slices in parallel, then per-item for
    /// slices that still fail.
    fn fallback_chunk(
        &self,
        chunk: &[String],
        base: usize,
        results: &mut [Option<Vec<f32>>],
        cancel: &CancelToken,
        retries: &AtomicUsize,
    ) -> Result<()> {
        let slice_size = self.config.fallback_batch_size.max(1);
        let slices: Vec<(usize, &[String])> = chunk
            .chunks(slice_size)
            .enumerate()
            .map(|(i, slice)| (base + i * slice_size, slice))
            .collect();

        let slice_outcomes: Vec<(usize, Result<Vec<Vec<f32>>>)> = self.pool.install(|| {
            use rayon::prelude::*;
            slices
                .par_iter()
                .map(|&(slice_base, slice)| {
                    (slice_base, self.call_with_retries(slice, cancel, retries))
                })
                .collect()
        });

        let mut item_jobs: Vec<(usize, &String)> = Vec::new();
        for (slice_base, outcome) in slice_outcomes {
            match outcome {
                Ok(vectors) => {
                    for (offset, vector) in vectors.into_iter().enumerate() {
                        results[slice_base + offset] = Some(vector);
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    warn!(error = %err, "fallback slice failed, degrading to single items");
                    let slice_len = slice_size.min(base + chunk.len() - slice_base);
                    for offset in 0..slice_len {
                        let idx = slice_base + offset;
                        item_jobs.push((idx, &chunk[idx - base]));
                    }
                }
            }
        }

        if item_jobs.is_empty() {
            return Ok(());
        }

        let item_outcomes: Vec<(usize, Result<Vec<f32>>)> = self.pool.install(|| {
            use rayon::prelude::*;
            item_jobs
                .par_iter()
                .map(|&(idx, text)| {
                    let outcome = self
                        .call_with_retries(std::slice::from_ref(text), cancel, retries)
                        .map(|mut v| v.remove(0));
                    (idx, outcome)
                })
                .collect()
        });

        for (idx, outcome) in item_outcomes {
            match outcome {
                Ok(vector) => results[idx] = Some(vector),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(_) => {} // dropped; counted by the caller
            }
        }
        Ok(())
    }

    /// One provider call with the configured retry budget.
    fn call_with_retries(
        &self,
        texts: &[String],
        cancel: &CancelToken,
        retries: &AtomicUsize,
    ) -> Result<Vec<Vec<f32>>> {
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut attempt = 0usize;

        loop {
            cancel.checkpoint()?;
            match self.provider.embed_batch(texts) {
                Ok(vectors) if vectors.len() == texts.len() => return Ok(vectors),
                Ok(vectors) => {
                    return Err(Error::Provider(format!(
                        "provider returned {} embeddings for {} inputs",
                        vectors.len(),
                        texts.len()
                    )));
                }
                Err(err) => {
                    if attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    retries.fetch_add(1, Ordering::Relaxed);
                    debug!(attempt, error = %err, "provider call failed, retrying");
                    std::thread::sleep(delay);
                }
            }
        }
    }
}
