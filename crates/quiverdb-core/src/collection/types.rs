//! Collection types and configuration.

use crate::cache::{QueryCache, QueryCacheStats};
use crate::config::ContentConfig;
use crate::distance::DistanceMetric;
use crate::embedding::{Vectorizer, VectorizerConfig};
use crate::index::{IndexKind, IndexStats, VectorIndex};
use crate::search::SearchExecutor;
use crate::storage::AsyncIoEngine;
use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;

/// Schema version written into collection metadata.
pub(crate) const COLLECTION_SCHEMA_VERSION: u16 = 1;

/// Per-collection content retention policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPolicy {
    /// Retain original text alongside vectors.
    pub enabled: bool,
    /// Reserved metadata field holding the text.
    pub field: String,
    /// Maximum retained bytes; longer text is truncated on a UTF-8
    /// boundary and a `<field>_truncated` marker is recorded.
    pub max_bytes: usize,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            field: "_content".to_string(),
            max_bytes: 65536,
        }
    }
}

impl From<&ContentConfig> for ContentPolicy {
    fn from(config: &ContentConfig) -> Self {
        Self {
            enabled: config.enabled,
            field: config.field.clone(),
            max_bytes: config.max_bytes,
        }
    }
}

impl ContentPolicy {
    /// Name of the truncation marker field.
    #[must_use]
    pub fn truncated_field(&self) -> String {
        format!("{}_truncated", self.field)
    }
}

/// Persistent collection metadata, stored as `config.json` in the
/// collection directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection name; also the directory name.
    pub name: String,
    /// Vector dimensionality.
    pub dimension: usize,
    /// Distance metric.
    pub metric: DistanceMetric,
    /// Index variant.
    pub index_kind: IndexKind,
    /// Optional vectorizer configuration.
    #[serde(default)]
    pub vectorizer: Option<VectorizerConfig>,
    /// HNSW graph parameters (ignored by flat collections).
    #[serde(default)]
    pub hnsw_params: crate::index::HnswParams,
    /// Content retention policy.
    pub content: ContentPolicy,
    /// Number of stored vectors at last save.
    #[serde(default)]
    pub count: usize,
    /// Metadata schema version.
    pub schema_version: u16,
}

impl CollectionConfig {
    /// Creates a config with default policies for the given shape.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        dimension: usize,
        metric: DistanceMetric,
        index_kind: IndexKind,
    ) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
            index_kind,
            vectorizer: None,
            hnsw_params: crate::index::HnswParams::default(),
            content: ContentPolicy::default(),
            count: 0,
            schema_version: COLLECTION_SCHEMA_VERSION,
        }
    }

    /// Attaches a vectorizer configuration.
    #[must_use]
    pub fn with_vectorizer(mut self, vectorizer: VectorizerConfig) -> Self {
        self.vectorizer = Some(vectorizer);
        self
    }

    /// Replaces the content policy.
    #[must_use]
    pub fn with_content_policy(mut self, content: ContentPolicy) -> Self {
        self.content = content;
        self
    }
}

/// Observable collection summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Vector dimensionality.
    pub dimension: usize,
    /// Distance metric.
    pub metric: DistanceMetric,
    /// Index variant.
    pub index_kind: IndexKind,
    /// Live vector count.
    pub count: usize,
    /// Whether original text is retained.
    pub content_enabled: bool,
    /// Model name of the configured vectorizer, when present.
    pub vectorizer_model: Option<String>,
    /// Index counters.
    pub index: IndexStats,
    /// Query cache counters.
    #[serde(skip)]
    pub cache: QueryCacheStats,
}

/// One stored vector with its metadata and head page.
pub(crate) struct StoredRecord {
    pub vector: Vec<f32>,
    pub metadata: Option<JsonValue>,
    /// Head page of the on-disk record chain.
    pub page_id: u32,
}

/// A named, dimension-fixed, metric-fixed container of vectors.
///
/// The `records` lock is the collection's authoritative reader-writer
/// lock: writers take it exclusively, searches take it shared. The query
/// cache has its own lock and is only touched after this one is released.
pub struct Collection {
    pub(crate) path: PathBuf,
    pub(crate) config: RwLock<CollectionConfig>,
    pub(crate) records: RwLock<FxHashMap<String, StoredRecord>>,
    pub(crate) index: Box<dyn VectorIndex>,
    /// Swapped atomically so a provider replacement never blocks readers.
    pub(crate) vectorizer: ArcSwapOption<Box<dyn Vectorizer>>,
    pub(crate) io: AsyncIoEngine,
    pub(crate) executor: SearchExecutor,
    pub(crate) cache: QueryCache,
    pub(crate) embedding: crate::config::EmbeddingConfig,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").finish_non_exhaustive()
    }
}

impl Collection {
    /// Atomically replaces the vectorizer. Passing `None` removes it.
    pub fn set_vectorizer(&self, vectorizer: Option<Box<dyn Vectorizer>>) {
        self.vectorizer.store(vectorizer.map(std::sync::Arc::new));
    }
}
