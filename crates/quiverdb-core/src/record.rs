//! Vector record and search request/response types.

use crate::filter::Filter;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A stored vector: caller-assigned string id, fixed-length embedding, and
/// optional JSON metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique identifier within the collection.
    pub id: String,

    /// The vector embedding.
    pub vector: Vec<f32>,

    /// Optional JSON metadata. Original text, when retained, lives under
    /// the collection's reserved content field.
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

impl VectorRecord {
    /// Creates a new record with the given id, vector, and metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: Option<JsonValue>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata,
        }
    }

    /// Creates a new record without metadata.
    #[must_use]
    pub fn without_metadata(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self::new(id, vector, None)
    }

    /// Returns the dimension of the vector.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// A k-nearest-neighbor search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query vector; length must equal the collection dimension.
    pub vector: Vec<f32>,
    /// Maximum number of results.
    pub limit: usize,
    /// Results to skip before collecting `limit`.
    #[serde(default)]
    pub offset: usize,
    /// Optional metadata filter.
    #[serde(default)]
    pub filter: Option<Filter>,
    /// Include vector data in results.
    #[serde(default)]
    pub include_vector: bool,
    /// Include metadata in results.
    #[serde(default = "default_true")]
    pub include_metadata: bool,
    /// Include stored original content in results.
    #[serde(default)]
    pub include_content: bool,
}

fn default_true() -> bool {
    true
}

impl SearchRequest {
    /// Creates a request for the `limit` nearest neighbors of `vector`.
    #[must_use]
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            limit,
            offset: 0,
            filter: None,
            include_vector: false,
            include_metadata: true,
            include_content: false,
        }
    }

    /// Skips the first `offset` results.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Restricts results to records matching `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Includes vector data in results.
    #[must_use]
    pub fn with_vectors(mut self) -> Self {
        self.include_vector = true;
        self
    }

    /// Includes stored original content in results.
    #[must_use]
    pub fn with_content(mut self) -> Self {
        self.include_content = true;
        self
    }
}

/// A single search result.
///
/// All fields are defensive copies; mutating a hit never touches stored
/// collection state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Id of the matching record.
    pub id: String,
    /// Distance to the query; lower is closer.
    pub score: f32,
    /// Vector data, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// Metadata, when requested and present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    /// Original content, when requested and retained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
