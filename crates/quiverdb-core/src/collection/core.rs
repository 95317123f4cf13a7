//! Collection lifecycle and CRUD.
//!
//! On-disk layout per collection directory:
//!
//! ```text
//! <name>/
//! ├── config.json   # CollectionConfig document
//! ├── pages.dat     # page file (vectors + metadata as record chains)
//! ├── pages.wal     # write-ahead log
//! └── flat.idx | hnsw.idx   # index snapshot
//! ```
//!
//! A record is one bincode document split across a chain of pages; each
//! page payload starts with the next page id (0 = end). Deleting rewrites
//! the head as a metadata tombstone before the pages are freed, so a
//! cold-start scan never resurrects the record.

use crate::cancel::CancelToken;
use crate::cache::{CacheConfig, QueryCache};
use crate::config::EngineConfig;
use crate::embedding::{create_vectorizer, BatchEmbedder, BatchStats};
use crate::error::{Error, Result};
use crate::index::{create_index, open_index, VectorIndex};
use crate::record::VectorRecord;
use crate::search::SearchExecutor;
use crate::storage::page::payload_capacity;
use crate::storage::page_store::PageStore;
use crate::storage::{AsyncIoEngine, PageType};
use crate::util::is_valid_collection_name;
use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::types::{
    Collection, CollectionConfig, CollectionInfo, StoredRecord, COLLECTION_SCHEMA_VERSION,
};

const CONFIG_FILE: &str = "config.json";

use crate::index::hnsw::OPTIMIZE_TOMBSTONE_RATIO;

/// One record as serialized into its page chain.
#[derive(Serialize, Deserialize)]
struct RecordDoc {
    id: String,
    vector: Vec<f32>,
    metadata: Option<JsonValue>,
}

impl Collection {
    /// Creates a new collection directory and its initial files.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad name or dimension; IO and config
    /// errors otherwise.
    pub fn create(path: PathBuf, mut config: CollectionConfig, engine: &EngineConfig) -> Result<Self> {
        if !is_valid_collection_name(&config.name) {
            return Err(Error::InvalidArgument(format!(
                "invalid collection name '{}'",
                config.name
            )));
        }
        if config.dimension == 0 || config.dimension > 10_000 {
            return Err(Error::InvalidArgument(format!(
                "dimension {} is out of range [1, 10000]",
                config.dimension
            )));
        }
        if let Some(vectorizer) = &config.vectorizer {
            if vectorizer.dimension != config.dimension {
                return Err(Error::InvalidArgument(format!(
                    "vectorizer dimension {} does not match collection dimension {}",
                    vectorizer.dimension, config.dimension
                )));
            }
        }

        std::fs::create_dir_all(&path)?;
        config.schema_version = COLLECTION_SCHEMA_VERSION;
        config.count = 0;

        let store = Arc::new(PageStore::open(
            &path,
            engine.storage.page_size,
            engine.io.use_mmap,
        )?);
        let io = AsyncIoEngine::new(store, &engine.io);

        let index = create_index(
            config.index_kind,
            config.dimension,
            config.metric,
            &config.hnsw_params,
            &engine.simd,
        );

        let vectorizer = match &config.vectorizer {
            Some(vc) => ArcSwapOption::from(Some(Arc::new(create_vectorizer(vc)?))),
            None => ArcSwapOption::empty(),
        };

        let collection = Self {
            path,
            config: RwLock::new(config),
            records: RwLock::new(FxHashMap::default()),
            index,
            vectorizer,
            io,
            executor: SearchExecutor::new(&engine.search, engine.simd.clone()),
            cache: QueryCache::new(cache_config(engine)),
            embedding: engine.embedding.clone(),
        };
        collection.save_config()?;
        info!(name = %collection.config.read().name, "created collection");
        Ok(collection)
    }

    /// Opens an existing collection, replaying the log and rebuilding the
    /// in-memory map from the page file.
    ///
    /// # Errors
    ///
    /// `IndexCorrupted` when integrity checks fail; IO errors otherwise.
    pub fn open(path: PathBuf, engine: &EngineConfig) -> Result<Self> {
        let config_path = path.join(CONFIG_FILE);
        let config: CollectionConfig =
            serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

        let store = Arc::new(PageStore::open(
            &path,
            engine.storage.page_size,
            engine.io.use_mmap,
        )?);

        // Cold-start scan: walk every decodable head page and rebuild the
        // record map, reclaiming everything else as free space.
        let (records, live_pages) = scan_records(&store)?;
        store.reset_allocation(&live_pages);

        let index = open_index(
            config.index_kind,
            &path,
            config.dimension,
            config.metric,
            &config.hnsw_params,
            &engine.simd,
        )?;

        // The page store is authoritative after a crash; a stale snapshot
        // is rebuilt rather than trusted.
        if index.len() != records.len() {
            warn!(
                snapshot = index.len(),
                records = records.len(),
                "index snapshot disagrees with page store, rebuilding"
            );
            let fresh = create_index(
                config.index_kind,
                config.dimension,
                config.metric,
                &config.hnsw_params,
                &engine.simd,
            );
            let entries: Vec<(String, Vec<f32>)> = records
                .iter()
                .map(|(id, r)| (id.clone(), r.vector.clone()))
                .collect();
            fresh.build(&entries)?;
            return Self::assemble(path, config, records, fresh, store, engine);
        }

        Self::assemble(path, config, records, index, store, engine)
    }

    fn assemble(
        path: PathBuf,
        config: CollectionConfig,
        records: FxHashMap<String, StoredRecord>,
        index: Box<dyn crate::index::VectorIndex>,
        store: Arc<PageStore>,
        engine: &EngineConfig,
    ) -> Result<Self> {
        let vectorizer = match &config.vectorizer {
            Some(vc) => ArcSwapOption::from(Some(Arc::new(create_vectorizer(vc)?))),
            None => ArcSwapOption::empty(),
        };

        let collection = Self {
            path,
            config: RwLock::new(config),
            records: RwLock::new(records),
            index,
            vectorizer,
            io: AsyncIoEngine::new(store, &engine.io),
            executor: SearchExecutor::new(&engine.search, engine.simd.clone()),
            cache: QueryCache::new(cache_config(engine)),
            embedding: engine.embedding.clone(),
        };
        info!(
            name = %collection.config.read().name,
            count = collection.count(),
            "opened collection"
        );
        Ok(collection)
    }

    /// Inserts a vector record.
    ///
    /// The page chain is written (log first) before the in-memory map and
    /// index are updated, so no lock is held across I/O; a failure after
    /// the chain write frees the pages again.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch`, `DuplicateId`, `InvalidArgument` for an empty
    /// id, `StorageFailure`, or `Cancelled`.
    pub fn insert(&self, record: VectorRecord, cancel: &CancelToken) -> Result<()> {
        cancel.checkpoint()?;
        if record.id.is_empty() {
            return Err(Error::InvalidArgument("record id must not be empty".to_string()));
        }

        let dimension = self.config.read().dimension;
        if record.dimension() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: record.dimension(),
            });
        }

        if self.records.read().contains_key(&record.id) {
            return Err(Error::DuplicateId(record.id));
        }

        let doc = RecordDoc {
            id: record.id.clone(),
            vector: record.vector.clone(),
            metadata: record.metadata.clone(),
        };
        let head = self.write_record_chain(&doc, cancel)?;

        {
            let mut records = self.records.write();
            if records.contains_key(&record.id) {
                drop(records);
                self.rollback_chain(head);
                return Err(Error::DuplicateId(record.id));
            }
            if let Err(err) = self.index.add(&record.id, &record.vector) {
                drop(records);
                self.rollback_chain(head);
                return Err(err);
            }
            records.insert(
                record.id,
                StoredRecord {
                    vector: record.vector,
                    metadata: record.metadata,
                    page_id: head,
                },
            );
        }

        self.cache.invalidate_all();
        Ok(())
    }

    /// Inserts a batch of vector records; dimensions are validated up
    /// front so a bad batch fails before any write.
    ///
    /// # Errors
    ///
    /// As [`Collection::insert`], failing on the first bad record.
    pub fn insert_batch(&self, records: Vec<VectorRecord>, cancel: &CancelToken) -> Result<()> {
        let dimension = self.config.read().dimension;
        for record in &records {
            if record.dimension() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    actual: record.dimension(),
                });
            }
        }
        for record in records {
            self.insert(record, cancel)?;
        }
        Ok(())
    }

    /// Embeds `text` and inserts the result, applying the content policy.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when no vectorizer is configured or the metadata
    /// is not a JSON object; provider and insert errors otherwise.
    pub fn insert_text(
        &self,
        id: impl Into<String>,
        text: &str,
        metadata: Option<JsonValue>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let vectorizer = self
            .vectorizer
            .load_full()
            .ok_or_else(|| Error::InvalidArgument("collection has no vectorizer".to_string()))?;

        cancel.checkpoint()?;
        let vector = vectorizer.embed(text)?;
        let metadata = self.apply_content_policy(text, metadata)?;
        self.insert(VectorRecord::new(id, vector, metadata), cancel)
    }

    /// Embeds and inserts a batch of `(id, text, metadata)` items through
    /// the adaptive batch pipeline. Items whose embedding fails on every
    /// path are dropped; the stats report the counts.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` without a vectorizer; `ProviderFailure` when
    /// every item failed; insert errors otherwise.
    pub fn insert_text_batch(
        &self,
        items: Vec<(String, String, Option<JsonValue>)>,
        cancel: &CancelToken,
    ) -> Result<BatchStats> {
        let vectorizer = self
            .vectorizer
            .load_full()
            .ok_or_else(|| Error::InvalidArgument("collection has no vectorizer".to_string()))?;

        let embedder = BatchEmbedder::new(vectorizer, self.embedding.clone())?;
        let texts: Vec<String> = items.iter().map(|(_, text, _)| text.clone()).collect();
        let (embeddings, stats) = embedder.embed_batch(&texts, cancel)?;

        for ((id, text, metadata), embedding) in items.into_iter().zip(embeddings) {
            let Some(vector) = embedding else {
                continue; // dropped by the pipeline; already counted
            };
            let metadata = self.apply_content_policy(&text, metadata)?;
            self.insert(VectorRecord::new(id, vector, metadata), cancel)?;
        }
        Ok(stats)
    }

    /// Returns the stored record, with the vector cloned only when
    /// `include_vector` is set (the vector is empty otherwise).
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn get(&self, id: &str, include_vector: bool) -> Result<VectorRecord> {
        let records = self.records.read();
        let stored = records
            .get(id)
            .ok_or_else(|| Error::VectorNotFound(id.to_string()))?;
        Ok(VectorRecord {
            id: id.to_string(),
            vector: if include_vector {
                stored.vector.clone()
            } else {
                Vec::new()
            },
            metadata: stored.metadata.clone(),
        })
    }

    /// Deletes a record from the map, the index, and the page file.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id; storage errors otherwise.
    pub fn delete(&self, id: &str, cancel: &CancelToken) -> Result<()> {
        cancel.checkpoint()?;
        let head = {
            let records = self.records.read();
            records
                .get(id)
                .map(|r| r.page_id)
                .ok_or_else(|| Error::VectorNotFound(id.to_string()))?
        };

        // Collect the chain before tombstoning the head: the head payload
        // holds the next pointer.
        let chain = self.collect_chain(head, cancel)?;
        self.io
            .write(head, PageType::Metadata, vec![0u8; 4], cancel)?;

        {
            let mut records = self.records.write();
            if records.remove(id).is_none() {
                return Err(Error::VectorNotFound(id.to_string()));
            }
            if let Err(err) = self.index.remove(id) {
                // Map and index disagreed; surface loudly but keep going.
                error!(id, error = %err, "index missing a mapped record");
            }
        }

        for page in chain {
            self.io.store().free_page(page);
        }
        self.cache.invalidate_all();
        Ok(())
    }

    /// Live record count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.read().len()
    }

    /// Observable summary of this collection.
    #[must_use]
    pub fn info(&self) -> CollectionInfo {
        let config = self.config.read();
        CollectionInfo {
            name: config.name.clone(),
            dimension: config.dimension,
            metric: config.metric,
            index_kind: config.index_kind,
            count: self.records.read().len(),
            content_enabled: config.content.enabled,
            vectorizer_model: self
                .vectorizer
                .load()
                .as_ref()
                .map(|v| v.model_name().to_string()),
            index: self.index.stats(),
            cache: self.cache.stats(),
        }
    }

    /// Average observed search latency.
    #[must_use]
    pub fn average_search_latency(&self) -> Duration {
        self.executor.average_latency()
    }

    /// Drains the I/O engine and forces pages and log to stable storage,
    /// without checkpointing. The log keeps every committed batch.
    ///
    /// # Errors
    ///
    /// Surfaces storage failures.
    pub fn sync(&self, cancel: &CancelToken) -> Result<()> {
        self.io.sync(cancel)
    }

    /// Flushes all state: drains the I/O engine, checkpoints the log,
    /// persists the index snapshot and metadata, and compacts the index
    /// when tombstones have accumulated.
    ///
    /// # Errors
    ///
    /// Surfaces storage failures.
    pub fn flush(&self, cancel: &CancelToken) -> Result<()> {
        self.io.sync(cancel)?;

        let stats = self.index.stats();
        let total = stats.len + stats.deleted;
        #[allow(clippy::cast_precision_loss)]
        if total > 0 && (stats.deleted as f64) / (total as f64) > OPTIMIZE_TOMBSTONE_RATIO {
            info!(deleted = stats.deleted, live = stats.len, "optimizing index");
            self.index.optimize()?;
            self.cache.invalidate_all();
        }

        self.index.save(&self.path)?;
        self.io.store().checkpoint()?;

        {
            let mut config = self.config.write();
            config.count = self.records.read().len();
        }
        self.save_config()?;
        Ok(())
    }

    /// Flushes and releases the collection. The directory stays on disk.
    ///
    /// # Errors
    ///
    /// Surfaces flush failures.
    pub fn close(&self) -> Result<()> {
        self.flush(&CancelToken::never())
    }

    /// Rebuilds the index to reclaim tombstoned entries immediately.
    ///
    /// # Errors
    ///
    /// Surfaces rebuild failures.
    pub fn optimize(&self) -> Result<()> {
        self.index.optimize()?;
        self.cache.invalidate_all();
        Ok(())
    }

    pub(crate) fn save_config(&self) -> Result<()> {
        let config = self.config.read();
        let json = serde_json::to_string_pretty(&*config)?;
        let tmp = self.path.join(format!("{CONFIG_FILE}.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, self.path.join(CONFIG_FILE))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Record chains
    // ------------------------------------------------------------------

    fn write_record_chain(&self, doc: &RecordDoc, cancel: &CancelToken) -> Result<u32> {
        let bytes = bincode::serialize(doc)?;
        let store = self.io.store();
        let chunk_size = payload_capacity(store.page_size()) - 4;

        let chunks: Vec<&[u8]> = bytes.chunks(chunk_size).collect();
        let pages: Vec<u32> = (0..chunks.len()).map(|_| store.allocate_page()).collect();

        // Write back-to-front so every page's next pointer is final.
        for (i, chunk) in chunks.iter().enumerate().rev() {
            let next = pages.get(i + 1).copied().unwrap_or(0);
            let mut payload = Vec::with_capacity(4 + chunk.len());
            payload.extend_from_slice(&next.to_le_bytes());
            payload.extend_from_slice(chunk);

            let page_type = if i == 0 {
                PageType::VectorLeaf
            } else {
                PageType::Overflow
            };
            if let Err(err) = self.io.write(pages[i], page_type, payload, cancel) {
                for &page in &pages {
                    store.free_page(page);
                }
                return Err(err);
            }
        }
        Ok(pages[0])
    }

    fn collect_chain(&self, head: u32, cancel: &CancelToken) -> Result<Vec<u32>> {
        let mut chain: Vec<u32> = Vec::new();
        let mut next = Some(head);
        while let Some(id) = next {
            cancel.checkpoint()?;
            if chain.contains(&id) {
                return Err(Error::IndexCorrupted(format!(
                    "record chain at page {head} contains a cycle"
                )));
            }
            let page = self.io.read(id, cancel)?;
            let data = page.data();
            if data.len() < 4 {
                break;
            }
            chain.push(id);
            let pointer = u32::from_le_bytes(data[0..4].try_into().unwrap_or([0; 4]));
            next = (pointer != 0).then_some(pointer);
        }
        Ok(chain)
    }

    fn rollback_chain(&self, head: u32) {
        let never = CancelToken::never();
        match self.collect_chain(head, &never) {
            Ok(chain) => {
                let _ = self.io.write(head, PageType::Metadata, vec![0u8; 4], &never);
                for page in chain {
                    self.io.store().free_page(page);
                }
            }
            Err(err) => warn!(head, error = %err, "failed to roll back record chain"),
        }
    }

    fn apply_content_policy(
        &self,
        text: &str,
        metadata: Option<JsonValue>,
    ) -> Result<Option<JsonValue>> {
        let config = self.config.read();
        let policy = &config.content;
        if !policy.enabled {
            return Ok(metadata);
        }

        let mut doc = match metadata {
            Some(JsonValue::Object(map)) => map,
            None => serde_json::Map::new(),
            Some(_) => {
                return Err(Error::InvalidArgument(
                    "metadata must be a JSON object".to_string(),
                ))
            }
        };

        let mut end = policy.max_bytes.min(text.len());
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        let truncated = end < text.len();

        doc.insert(
            policy.field.clone(),
            JsonValue::String(text[..end].to_string()),
        );
        if truncated {
            doc.insert(policy.truncated_field(), JsonValue::Bool(true));
        }
        Ok(Some(JsonValue::Object(doc)))
    }
}

impl Drop for Collection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(error = %err, "failed to flush collection on drop");
        }
    }
}

fn cache_config(engine: &EngineConfig) -> CacheConfig {
    CacheConfig {
        enabled: engine.search.cache_enabled,
        max_entries: engine.search.cache_size,
        ttl: Duration::from_secs(engine.search.cache_ttl_secs),
        cleanup_interval: Duration::from_secs(engine.search.cleanup_interval_secs),
    }
}

/// Walks every decodable head page and rebuilds the record map.
fn scan_records(store: &PageStore) -> Result<(FxHashMap<String, StoredRecord>, FxHashSet<u32>)> {
    let mut records = FxHashMap::default();
    let mut live_pages = FxHashSet::default();

    for page_id in 2..store.page_count() {
        let Ok(page) = store.read_page(page_id) else {
            continue; // unwritten or torn page: reclaimed by reset_allocation
        };
        if page.page_type != PageType::VectorLeaf {
            continue;
        }

        // Follow the chain, concatenating chunks.
        let mut bytes = Vec::new();
        let mut chain: Vec<u32> = Vec::new();
        let mut next = Some(page_id);
        let mut valid = true;
        while let Some(id) = next {
            if chain.contains(&id) {
                valid = false; // cycle in the chain
                break;
            }
            let Ok(link) = store.read_page(id) else {
                valid = false;
                break;
            };
            let data = link.data();
            if data.len() < 4 {
                valid = false;
                break;
            }
            chain.push(id);
            bytes.extend_from_slice(&data[4..]);
            let pointer = u32::from_le_bytes(data[0..4].try_into().unwrap_or([0; 4]));
            next = (pointer != 0).then_some(pointer);
        }
        if !valid {
            warn!(page_id, "skipping record with a broken page chain");
            continue;
        }

        let Ok(doc) = bincode::deserialize::<RecordDoc>(&bytes) else {
            warn!(page_id, "skipping undecodable record document");
            continue;
        };

        live_pages.extend(chain.iter().copied());
        records.insert(
            doc.id,
            StoredRecord {
                vector: doc.vector,
                metadata: doc.metadata,
                page_id,
            },
        );
    }

    Ok((records, live_pages))
}
