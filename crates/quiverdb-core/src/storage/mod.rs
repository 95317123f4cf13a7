//! Persistent storage: pages, write-ahead log, and the I/O engines.
//!
//! Layering, bottom up:
//!
//! - [`page`]: fixed-size pages with typed, CRC-protected headers
//! - [`mmap`]: file-backed byte region (memory-mapped or buffered)
//! - [`wal`]: length/seq/CRC-framed write-ahead log
//! - [`page_store`]: page allocation, WAL-before-write, replay on open
//! - [`async_io`]: worker pool serializing page I/O behind bounded queues

pub mod async_io;
pub mod mmap;
pub mod page;
pub mod page_store;
pub mod wal;

#[cfg(test)]
mod page_tests;
#[cfg(test)]
mod wal_tests;

pub use async_io::AsyncIoEngine;
pub use mmap::{Region, RegionMode};
pub use page::{Page, PageType, PAGE_HEADER_SIZE};
pub use page_store::PageStore;
pub use wal::{Wal, WalRecord, WalRecordKind};
