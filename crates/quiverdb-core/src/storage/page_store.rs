//! Page store: allocation, WAL-before-write, and replay on open.
//!
//! Every mutation batch is appended to the log and fsynced before the
//! in-place page writes, so the live file never depends on a write that
//! the log cannot reproduce. On open, committed batches newer than the
//! on-disk page images are reapplied, the file is synced, and the log is
//! truncated.

use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::{debug, info};

use super::mmap::{Region, RegionMode};
use super::page::{FileHeader, Page, PageType, SCHEMA_VERSION};
use super::wal::{Wal, WalRecord, WalRecordKind};

/// Page file name inside a collection directory.
pub const PAGE_FILE: &str = "pages.dat";
/// Log file name inside a collection directory.
pub const WAL_FILE: &str = "pages.wal";

/// Reserved page id for the free-list root.
const FREE_LIST_PAGE: u32 = 1;
/// First allocatable page id.
const FIRST_DATA_PAGE: u32 = 2;

#[derive(serde::Serialize, serde::Deserialize, Default)]
struct FreeListState {
    next_page_id: u32,
    free: Vec<u32>,
}

/// Fixed-size page store with a write-ahead log.
pub struct PageStore {
    dir: PathBuf,
    page_size: u32,
    region: Region,
    wal: Wal,
    free_list: Mutex<Vec<u32>>,
    next_page_id: AtomicU32,
    next_seq: AtomicU64,
    header: RwLock<FileHeader>,
}

impl PageStore {
    /// Opens (or creates) a page store in `dir`.
    ///
    /// An existing file's page size wins over the requested one. Replay
    /// of the log happens here; after a clean open the log is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexCorrupted`] when page zero fails validation,
    /// IO errors otherwise.
    pub fn open(dir: &Path, page_size: u32, use_mmap: bool) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let page_path = dir.join(PAGE_FILE);
        let wal_path = dir.join(WAL_FILE);

        let fresh = !page_path.exists() || std::fs::metadata(&page_path)?.len() == 0;

        let region = Region::open(
            &page_path,
            u64::from(page_size) * u64::from(FIRST_DATA_PAGE),
            RegionMode::ReadWrite,
            use_mmap,
        )?;
        let wal = Wal::open(&wal_path)?;

        let store = if fresh {
            let header = FileHeader {
                schema_version: SCHEMA_VERSION,
                page_size,
                free_list_root: FREE_LIST_PAGE,
            };
            region.write_at(0, &header.encode())?;

            let store = Self {
                dir: dir.to_path_buf(),
                page_size,
                region,
                wal,
                free_list: Mutex::new(Vec::new()),
                next_page_id: AtomicU32::new(FIRST_DATA_PAGE),
                next_seq: AtomicU64::new(1),
                header: RwLock::new(header),
            };
            store.persist_free_list()?;
            store.region.sync()?;
            info!(dir = %dir.display(), page_size, "created page store");
            store
        } else {
            let mut header_bytes = vec![0u8; page_size as usize];
            // Page zero always exists in a non-fresh file; a short file here
            // means the header itself was torn.
            let probe = region.len().min(u64::from(page_size)) as usize;
            region.read_at(0, &mut header_bytes[..probe])?;
            let header = FileHeader::decode(&header_bytes[..probe])?;
            let page_size = header.page_size;

            let store = Self {
                dir: dir.to_path_buf(),
                page_size,
                region,
                wal,
                free_list: Mutex::new(Vec::new()),
                next_page_id: AtomicU32::new(FIRST_DATA_PAGE),
                next_seq: AtomicU64::new(1),
                header: RwLock::new(header),
            };
            store.load_free_list();
            store.replay()?;
            store
        };

        Ok(store)
    }

    /// Page size in bytes.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Directory this store lives in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Schema version recorded in page zero.
    #[must_use]
    pub fn schema_version(&self) -> u16 {
        self.header.read().schema_version
    }

    /// Number of page slots currently backed by the file.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // file size / page size fits u32 by construction
    pub fn page_count(&self) -> u32 {
        (self.region.len() / u64::from(self.page_size)) as u32
    }

    /// Rebuilds allocation state from a set of live page ids.
    ///
    /// Called after a cold-start scan: every allocatable page not in
    /// `live` becomes free, which also reclaims chains orphaned by a
    /// crash between a delete and its checkpoint.
    pub fn reset_allocation(&self, live: &rustc_hash::FxHashSet<u32>) {
        let highest_live = live.iter().copied().max().unwrap_or(0);
        let next = (highest_live + 1).max(FIRST_DATA_PAGE);
        self.next_page_id.store(next, Ordering::Relaxed);

        let mut free = self.free_list.lock();
        free.clear();
        for id in FIRST_DATA_PAGE..next {
            if !live.contains(&id) {
                free.push(id);
            }
        }
    }

    /// Allocates a page id, reusing freed pages first.
    pub fn allocate_page(&self) -> u32 {
        if let Some(id) = self.free_list.lock().pop() {
            return id;
        }
        self.next_page_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns a page id to the free list.
    pub fn free_page(&self, id: u32) {
        if id >= FIRST_DATA_PAGE {
            self.free_list.lock().push(id);
        }
    }

    /// Reads and validates a page.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range id, [`Error::IndexCorrupted`]
    /// for CRC failures.
    pub fn read_page(&self, id: u32) -> Result<Page> {
        let offset = u64::from(id) * u64::from(self.page_size);
        if offset + u64::from(self.page_size) > self.region.len() {
            return Err(Error::InvalidArgument(format!(
                "page {id} is beyond the end of the file"
            )));
        }
        let mut buf = vec![0u8; self.page_size as usize];
        self.region.read_at(offset, &mut buf)?;
        Page::decode(&buf)
    }

    /// Writes one page durably (log first, then in place).
    ///
    /// # Errors
    ///
    /// Surfaces log and page-file failures.
    pub fn write_page(&self, id: u32, page_type: PageType, data: &[u8]) -> Result<Page> {
        let mut pages = self.write_batch(&[(id, page_type, data)])?;
        Ok(pages.remove(0))
    }

    /// Writes a batch of pages as one committed log unit.
    ///
    /// The log is appended and fsynced before any in-place write, so a
    /// crash between the two leaves a replayable log rather than a torn
    /// file.
    ///
    /// # Errors
    ///
    /// Surfaces log and page-file failures.
    pub fn write_batch(&self, writes: &[(u32, PageType, &[u8])]) -> Result<Vec<Page>> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }

        let begin_seq = self.next_seq.fetch_add(writes.len() as u64 + 2, Ordering::Relaxed);
        self.wal.append(&WalRecord {
            seq: begin_seq,
            kind: WalRecordKind::Begin,
            payload: Vec::new(),
        })?;

        let mut pages = Vec::with_capacity(writes.len());
        for (i, &(id, page_type, data)) in writes.iter().enumerate() {
            let seq = begin_seq + 1 + i as u64;
            #[allow(clippy::cast_possible_truncation)]
            let page = Page::new(id, page_type, seq as u32, data, self.page_size)?;
            self.wal.append(&WalRecord {
                seq,
                kind: WalRecordKind::PageWrite,
                payload: page.encode(self.page_size),
            })?;
            pages.push(page);
        }

        self.wal.append(&WalRecord {
            seq: begin_seq + 1 + writes.len() as u64,
            kind: WalRecordKind::Commit,
            payload: Vec::new(),
        })?;
        self.wal.flush()?;

        for page in &pages {
            let offset = u64::from(page.id) * u64::from(self.page_size);
            self.region.write_at(offset, &page.encode(self.page_size))?;
        }

        Ok(pages)
    }

    /// Forces all page data and the log to stable storage.
    ///
    /// # Errors
    ///
    /// Surfaces fsync failures.
    pub fn sync(&self) -> Result<()> {
        self.region.sync()?;
        self.wal.flush()?;
        Ok(())
    }

    /// Syncs, persists the free list, and truncates the log.
    ///
    /// # Errors
    ///
    /// Surfaces IO failures; the log is only truncated after a clean sync.
    pub fn checkpoint(&self) -> Result<()> {
        self.persist_free_list()?;
        self.region.sync()?;
        self.wal.append(&WalRecord {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            kind: WalRecordKind::Checkpoint,
            payload: Vec::new(),
        })?;
        self.wal.flush()?;
        self.wal.reset()?;
        debug!("page store checkpoint complete");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn persist_free_list(&self) -> Result<()> {
        let state = FreeListState {
            next_page_id: self.next_page_id.load(Ordering::Relaxed),
            free: self.free_list.lock().clone(),
        };
        let body = bincode::serialize(&state)?;
        let seq = self.next_seq.load(Ordering::Relaxed);
        #[allow(clippy::cast_possible_truncation)]
        let page = Page::new(
            FREE_LIST_PAGE,
            PageType::FreeList,
            seq as u32,
            &body,
            self.page_size,
        )?;
        let offset = u64::from(FREE_LIST_PAGE) * u64::from(self.page_size);
        self.region.write_at(offset, &page.encode(self.page_size))?;
        Ok(())
    }

    fn load_free_list(&self) {
        if let Ok(page) = self.read_page(FREE_LIST_PAGE) {
            if let Ok(state) = bincode::deserialize::<FreeListState>(page.data()) {
                self.next_page_id
                    .store(state.next_page_id.max(FIRST_DATA_PAGE), Ordering::Relaxed);
                *self.free_list.lock() = state.free;
            }
        }
    }

    /// Applies committed log records newer than the on-disk page images.
    fn replay(&self) -> Result<()> {
        let records = Wal::replay(&self.dir.join(WAL_FILE))?;
        if records.is_empty() {
            return Ok(());
        }

        let mut applied = 0usize;
        let mut max_seq = 0u64;
        let mut touched: Vec<u32> = Vec::new();

        for record in &records {
            max_seq = max_seq.max(record.seq);
            if record.kind != WalRecordKind::PageWrite {
                continue;
            }
            let Ok(page) = Page::decode(&record.payload) else {
                continue;
            };

            // A page image in the file that already reflects this (or a
            // later) sequence does not need the record replayed.
            let on_disk_seq = self.read_page(page.id).ok().map(|p| p.seq);
            if on_disk_seq.is_some_and(|disk| disk >= page.seq) {
                continue;
            }

            let offset = u64::from(page.id) * u64::from(self.page_size);
            self.region.write_at(offset, &record.payload)?;
            touched.push(page.id);
            applied += 1;
        }

        // Replayed pages are live: they must neither be handed out twice
        // nor sit on a stale free list snapshot.
        {
            let mut free = self.free_list.lock();
            free.retain(|id| !touched.contains(id));
            let next = self.next_page_id.load(Ordering::Relaxed);
            let highest = touched.iter().copied().max().unwrap_or(0);
            if highest >= next {
                self.next_page_id.store(highest + 1, Ordering::Relaxed);
            }
        }

        self.next_seq.store(max_seq + 1, Ordering::Relaxed);
        info!(applied, "replayed write-ahead log");

        self.persist_free_list()?;
        self.region.sync()?;
        self.wal.reset()?;
        Ok(())
    }
}
