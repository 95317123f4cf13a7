//! Tests for the batch embedding pipeline

use super::batch::BatchEmbedder;
use super::local::LocalHashVectorizer;
use super::Vectorizer;
use crate::cancel::CancelToken;
use crate::config::EmbeddingConfig;
use crate::error::{Error, ErrorKind, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Provider that fails a configurable number of calls before recovering.
struct FlakyProvider {
    inner: LocalHashVectorizer,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    /// Only calls with at least this many texts fail (0 = all fail).
    min_failing_batch: usize,
}

impl FlakyProvider {
    fn new(dimension: usize, failures: usize, min_failing_batch: usize) -> Self {
        Self {
            inner: LocalHashVectorizer::new(dimension),
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
            min_failing_batch,
        }
    }
}

impl Vectorizer for FlakyProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.len() >= self.min_failing_batch
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(Error::Provider("transient upstream error".to_string()));
        }
        self.inner.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        "flaky"
    }
}

/// Provider that always fails.
struct DeadProvider;

impl Vectorizer for DeadProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::Provider("permanently down".to_string()))
    }

    fn dimension(&self) -> usize {
        8
    }

    fn model_name(&self) -> &str {
        "dead"
    }
}

fn texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("document number {i}")).collect()
}

fn config() -> EmbeddingConfig {
    EmbeddingConfig {
        batch_size: 16,
        fallback_batch_size: 4,
        max_retries: 0,
        retry_delay_ms: 1,
        max_workers: 4,
        fallback_enabled: true,
    }
}

#[test]
fn test_happy_path_single_batch() {
    let provider = Arc::new(LocalHashVectorizer::new(32));
    let embedder = BatchEmbedder::new(provider.clone(), config()).unwrap();

    let input = texts(10);
    let (results, stats) = embedder.embed_batch(&input, &CancelToken::never()).unwrap();

    assert_eq!(results.len(), 10);
    assert!(results.iter().all(Option::is_some));
    assert_eq!(stats.successful_texts, 10);
    assert_eq!(stats.failed_texts, 0);
    assert_eq!(stats.batches_processed, 1);
    assert_eq!(stats.fallbacks_used, 0);

    // Order is preserved.
    for (i, result) in results.iter().enumerate() {
        let expected = provider.embed(&input[i]).unwrap();
        assert_eq!(result.as_ref().unwrap(), &expected);
    }
}

#[test]
fn test_retry_recovers_transient_failure() {
    // One failure, retry budget of 2: the retry succeeds.
    let provider = Arc::new(FlakyProvider::new(16, 1, 0));
    let embedder = BatchEmbedder::new(
        provider,
        EmbeddingConfig {
            max_retries: 2,
            ..config()
        },
    )
    .unwrap();

    let (results, stats) = embedder
        .embed_batch(&texts(8), &CancelToken::never())
        .unwrap();
    assert!(results.iter().all(Option::is_some));
    assert_eq!(stats.retries_used, 1);
    assert_eq!(stats.fallbacks_used, 0);
}

#[test]
fn test_fallback_after_full_batch_failure() {
    // Full batches (>= 16 texts) fail once; fallback slices of 4 succeed.
    // 16 texts, primary batch 16, fallback 4: all 16 embeddings still
    // come back, in input order.
    let provider = Arc::new(FlakyProvider::new(16, 1, 16));
    let embedder = BatchEmbedder::new(provider.clone(), config()).unwrap();

    let input = texts(16);
    let (results, stats) = embedder.embed_batch(&input, &CancelToken::never()).unwrap();

    assert_eq!(stats.successful_texts, 16);
    assert!(stats.fallbacks_used >= 1);
    for (i, result) in results.iter().enumerate() {
        let expected = provider.embed(&input[i]).unwrap();
        assert_eq!(result.as_ref().unwrap(), &expected, "index {i} out of order");
    }
}

#[test]
fn test_all_items_failing_surfaces_provider_error() {
    let embedder = BatchEmbedder::new(Arc::new(DeadProvider), config()).unwrap();
    let err = embedder
        .embed_batch(&texts(5), &CancelToken::never())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderFailure);
}

#[test]
fn test_empty_input_is_trivially_ok() {
    let embedder = BatchEmbedder::new(Arc::new(DeadProvider), config()).unwrap();
    let (results, stats) = embedder.embed_batch(&[], &CancelToken::never()).unwrap();
    assert!(results.is_empty());
    assert_eq!(stats.successful_texts, 0);
    assert_eq!(stats.failed_texts, 0);
}

#[test]
fn test_cancellation_aborts_pipeline() {
    let embedder =
        BatchEmbedder::new(Arc::new(LocalHashVectorizer::new(16)), config()).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = embedder.embed_batch(&texts(4), &cancel).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn test_multiple_primary_batches() {
    let provider = Arc::new(LocalHashVectorizer::new(16));
    let embedder = BatchEmbedder::new(
        provider,
        EmbeddingConfig {
            batch_size: 8,
            ..config()
        },
    )
    .unwrap();

    let (results, stats) = embedder
        .embed_batch(&texts(20), &CancelToken::never())
        .unwrap();
    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 20);
    assert_eq!(stats.batches_processed, 3);
    assert!(stats.throughput > 0.0);
}
