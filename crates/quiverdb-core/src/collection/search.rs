//! Collection search: cache consultation, index dispatch, and result
//! hydration.
//!
//! Flat collections scan through the parallel executor; HNSW collections
//! query the graph with an over-fetch margin when a filter is present.
//! Hits carry defensive copies; the reserved content field is stripped
//! from returned metadata and surfaced separately when requested.

use crate::cancel::CancelToken;
use crate::cache::fingerprint;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::index::{IndexKind, VectorIndex};
use crate::record::{SearchHit, SearchRequest};
use crate::search::ScanEntry;
use serde_json::Value as JsonValue;
use tracing::trace;

use super::types::Collection;

/// Candidate multiplier when a filter must be applied after an
/// approximate index search.
const FILTER_OVERFETCH: usize = 4;

impl Collection {
    /// Searches for the request's nearest neighbors.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero limit, `DimensionMismatch` for a
    /// wrong-length query, `Cancelled` when the token fires.
    pub fn search(&self, request: &SearchRequest, cancel: &CancelToken) -> Result<Vec<SearchHit>> {
        cancel.checkpoint()?;
        if request.limit == 0 {
            return Err(Error::InvalidArgument(
                "search limit must be positive".to_string(),
            ));
        }

        let (dimension, index_kind) = {
            let config = self.config.read();
            (config.dimension, config.index_kind)
        };
        if request.vector.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: request.vector.len(),
            });
        }

        let key = fingerprint(request);
        if let Some(hits) = self.cache.get(key) {
            trace!(key, "search served from cache");
            return Ok(hits);
        }

        let ranked = match index_kind {
            IndexKind::Flat => self.scan_flat(request, cancel)?,
            IndexKind::Hnsw => self.scan_hnsw(request, cancel)?,
        };

        let hits = self.hydrate(ranked, request);
        // The collection lock is released before the cache is touched.
        self.cache.insert(key, hits.clone());
        Ok(hits)
    }

    /// Vectorizes `query` and searches.
    ///
    /// Results include stored content when the collection retains it.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` without a vectorizer; provider and search errors
    /// otherwise.
    pub fn search_text(
        &self,
        query: &str,
        limit: usize,
        filter: Option<Filter>,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchHit>> {
        let vectorizer = self
            .vectorizer
            .load_full()
            .ok_or_else(|| Error::InvalidArgument("collection has no vectorizer".to_string()))?;

        cancel.checkpoint()?;
        let vector = vectorizer.embed(query)?;

        let mut request = SearchRequest::new(vector, limit);
        request.filter = filter;
        request.include_content = self.config.read().content.enabled;
        self.search(&request, cancel)
    }

    /// Exhaustive scan through the parallel executor.
    fn scan_flat(
        &self,
        request: &SearchRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<(String, f32)>> {
        let metric = self.config.read().metric;
        let records = self.records.read();
        let entries: Vec<ScanEntry<'_>> = records
            .iter()
            .map(|(id, r)| (id.as_str(), r.vector.as_slice(), r.metadata.as_ref()))
            .collect();
        self.executor.execute(request, metric, &entries, cancel)
    }

    /// Graph search with post-filtering and over-fetch.
    fn scan_hnsw(
        &self,
        request: &SearchRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<(String, f32)>> {
        let take = request.offset + request.limit;
        let candidates = if request.filter.is_some() {
            (take * FILTER_OVERFETCH).max(take + 16)
        } else {
            take
        };

        cancel.checkpoint()?;
        let ranked = self.index.search(&request.vector, candidates)?;

        let records = self.records.read();
        let mut filtered = Vec::with_capacity(take);
        for (id, score) in ranked {
            cancel.checkpoint()?;
            if let Some(filter) = &request.filter {
                let metadata = records.get(&id).and_then(|r| r.metadata.as_ref());
                if !filter.matches(metadata) {
                    continue;
                }
            }
            filtered.push((id, score));
            if filtered.len() >= take {
                break;
            }
        }

        Ok(filtered
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect())
    }

    /// Materializes hits with defensive copies per the include flags.
    fn hydrate(&self, ranked: Vec<(String, f32)>, request: &SearchRequest) -> Vec<SearchHit> {
        let content_field = {
            let config = self.config.read();
            config.content.field.clone()
        };
        let records = self.records.read();

        ranked
            .into_iter()
            .filter_map(|(id, score)| {
                let stored = records.get(&id)?;

                let content = if request.include_content {
                    stored
                        .metadata
                        .as_ref()
                        .and_then(|m| m.get(&content_field))
                        .and_then(JsonValue::as_str)
                        .map(String::from)
                } else {
                    None
                };

                let metadata = if request.include_metadata {
                    stored.metadata.as_ref().map(|m| {
                        // The reserved field travels in `content`, not in
                        // the metadata copy.
                        let mut copy = m.clone();
                        if let JsonValue::Object(map) = &mut copy {
                            map.remove(&content_field);
                        }
                        copy
                    })
                } else {
                    None
                };

                Some(SearchHit {
                    id,
                    score,
                    vector: request.include_vector.then(|| stored.vector.clone()),
                    metadata,
                    content,
                })
            })
            .collect()
    }
}
