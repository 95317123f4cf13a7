//! Text vectorization.
//!
//! [`Vectorizer`] is the contract for turning text into vectors. All
//! implementations are blocking and thread-safe; concurrency comes from
//! the batch pipeline's worker pool, not from an async runtime.
//!
//! Providers:
//!
//! - [`LocalHashVectorizer`] — deterministic feature hashing, no network
//! - [`OpenAiCompatibleVectorizer`] — any `/v1/embeddings`-shaped API
//! - [`OllamaVectorizer`] — a local Ollama daemon
//! - [`HuggingFaceVectorizer`] — the hosted inference API

mod batch;
mod local;
mod remote;

#[cfg(test)]
mod batch_tests;
#[cfg(test)]
mod local_tests;

pub use batch::{BatchEmbedder, BatchStats};
pub use local::LocalHashVectorizer;
pub use remote::{HuggingFaceVectorizer, OllamaVectorizer, OpenAiCompatibleVectorizer};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Embedding provider contract.
///
/// Implementations must be `Send + Sync`; batches default to sequential
/// single embeds unless the provider has a cheaper bulk path.
pub trait Vectorizer: Send + Sync {
    /// Embeds a single text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`] when the backing model call fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a batch of texts, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`] when the backing model call fails; a
    /// failed bulk call fails the whole batch (the pipeline in
    /// [`BatchEmbedder`] handles degradation).
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Dimension of produced vectors.
    fn dimension(&self) -> usize;

    /// Model identifier, for logs and collection metadata.
    fn model_name(&self) -> &str;

    /// Releases provider resources. Default: nothing to release.
    fn close(&self) {}
}

// A boxed provider is itself a provider, so `Arc<Box<dyn Vectorizer>>`
// (the shape arc-swap can hold) unsizes back to `Arc<dyn Vectorizer>`.
impl<T: Vectorizer + ?Sized> Vectorizer for Box<T> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn close(&self) {
        (**self).close();
    }
}

/// Vectorizer variant selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorizerKind {
    /// Deterministic feature-hashing embedder; offline and test use.
    #[default]
    Local,
    /// OpenAI-compatible `/v1/embeddings` endpoint.
    OpenaiCompatible,
    /// Ollama daemon `/api/embeddings` endpoint.
    Ollama,
    /// HuggingFace hosted feature-extraction pipeline.
    Huggingface,
}

/// Declarative vectorizer configuration, stored in collection metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Provider variant.
    pub kind: VectorizerKind,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Endpoint base URL; provider-specific default when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key. The key
    /// itself is never stored.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Dimension of the produced vectors.
    pub dimension: usize,
}

impl VectorizerConfig {
    /// Config for the deterministic local embedder.
    #[must_use]
    pub fn local(dimension: usize) -> Self {
        Self {
            kind: VectorizerKind::Local,
            model: "feature-hash".to_string(),
            endpoint: None,
            api_key_env: None,
            dimension,
        }
    }
}

/// Instantiates a vectorizer from its configuration.
///
/// # Errors
///
/// Returns [`Error::Config`] for an unusable configuration (zero
/// dimension, missing API key variable).
pub fn create_vectorizer(config: &VectorizerConfig) -> Result<Box<dyn Vectorizer>> {
    if config.dimension == 0 {
        return Err(Error::Config(
            "vectorizer dimension must be positive".to_string(),
        ));
    }

    let api_key = match &config.api_key_env {
        Some(var) => Some(std::env::var(var).map_err(|_| {
            Error::Config(format!("environment variable '{var}' is not set"))
        })?),
        None => None,
    };

    match config.kind {
        VectorizerKind::Local => Ok(Box::new(LocalHashVectorizer::new(config.dimension))),
        VectorizerKind::OpenaiCompatible => Ok(Box::new(OpenAiCompatibleVectorizer::new(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
            config.dimension,
        ))),
        VectorizerKind::Ollama => Ok(Box::new(OllamaVectorizer::new(
            config.endpoint.clone(),
            config.model.clone(),
            config.dimension,
        ))),
        VectorizerKind::Huggingface => Ok(Box::new(HuggingFaceVectorizer::new(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
            config.dimension,
        ))),
    }
}
