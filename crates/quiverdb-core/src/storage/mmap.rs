//! File-backed byte region: memory-mapped with a buffered fallback.
//!
//! [`Region`] wraps a file as a contiguous byte range of a declared size
//! with the same surface in both modes, so callers never branch on the
//! platform or the `io.use_mmap` setting.
//!
//! Vector accessors require 4-byte-aligned offsets (float32) and validate
//! bounds; violations fail with `InvalidArgument` before any I/O happens.

use crate::error::{Error, Result};
use memmap2::{Mmap, MmapMut};
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Minimum growth step when a region is extended.
const MIN_GROWTH: u64 = 1024 * 1024;

/// Access mode for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionMode {
    /// Reads only; writes fail with `InvalidArgument`.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    fn len(&self) -> usize {
        match self {
            Self::ReadOnly(m) => m.len(),
            Self::ReadWrite(m) => m.len(),
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            Self::ReadOnly(m) => m,
            Self::ReadWrite(m) => m,
        }
    }
}

struct MappedRegion {
    file: File,
    mapping: RwLock<Mapping>,
}

struct BufferedRegion {
    file: Mutex<File>,
    len: AtomicU64,
}

enum RegionInner {
    Mapped(MappedRegion),
    Buffered(BufferedRegion),
}

/// A contiguous byte region backed by a file.
pub struct Region {
    mode: RegionMode,
    inner: RegionInner,
}

impl Region {
    /// Opens (or creates) a region of at least `len` bytes.
    ///
    /// `use_mmap = false` selects the buffered positioned-I/O fallback
    /// with the identical surface.
    ///
    /// # Errors
    ///
    /// Surfaces file and mapping failures.
    pub fn open(path: &Path, len: u64, mode: RegionMode, use_mmap: bool) -> Result<Self> {
        let writable = mode == RegionMode::ReadWrite;
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .create(writable)
            .truncate(false)
            .open(path)?;

        let current = file.metadata()?.len();
        if current < len {
            if !writable {
                return Err(Error::InvalidArgument(format!(
                    "read-only region shorter than declared size ({current} < {len})"
                )));
            }
            file.set_len(len)?;
        }

        let inner = if use_mmap {
            let mapping = if writable {
                // SAFETY: the file is open read-write and set_len above
                // guarantees the mapped range is fully allocated.
                Mapping::ReadWrite(unsafe { MmapMut::map_mut(&file)? })
            } else {
                // SAFETY: the file is open readable and at least `len` long.
                Mapping::ReadOnly(unsafe { Mmap::map(&file)? })
            };
            RegionInner::Mapped(MappedRegion {
                file,
                mapping: RwLock::new(mapping),
            })
        } else {
            let len = file.metadata()?.len();
            RegionInner::Buffered(BufferedRegion {
                file: Mutex::new(file),
                len: AtomicU64::new(len),
            })
        };

        Ok(Self { mode, inner })
    }

    /// Current region length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        match &self.inner {
            RegionInner::Mapped(m) => m.mapping.read().len() as u64,
            RegionInner::Buffered(b) => b.len.load(Ordering::Acquire),
        }
    }

    /// Returns true if the region is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grows the region to hold at least `required` bytes.
    ///
    /// Growth is exponential with a 1 MiB floor so bulk writes amortize
    /// the remap cost.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on a read-only region; otherwise IO failures.
    pub fn ensure_len(&self, required: u64) -> Result<()> {
        if self.mode == RegionMode::ReadOnly {
            return Err(Error::InvalidArgument(
                "cannot grow a read-only region".to_string(),
            ));
        }
        if required <= self.len() {
            return Ok(());
        }

        let current = self.len();
        let new_len = required
            .max(current.saturating_mul(2))
            .max(current.saturating_add(MIN_GROWTH));

        match &self.inner {
            RegionInner::Mapped(m) => {
                let mut mapping = m.mapping.write();
                if let Mapping::ReadWrite(map) = &*mapping {
                    map.flush()?;
                }
                m.file.set_len(new_len)?;
                // SAFETY: set_len above allocated the full new range; the
                // old mapping is dropped by the assignment.
                *mapping = Mapping::ReadWrite(unsafe { MmapMut::map_mut(&m.file)? });
            }
            RegionInner::Buffered(b) => {
                let file = b.file.lock();
                file.set_len(new_len)?;
                b.len.store(new_len, Ordering::Release);
            }
        }
        debug!(new_len, "region grown");
        Ok(())
    }

    /// Reads `buf.len()` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the range exceeds the region.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset + buf.len() as u64;
        if end > self.len() {
            return Err(Error::InvalidArgument(format!(
                "read of {} bytes at offset {offset} exceeds region of {}",
                buf.len(),
                self.len()
            )));
        }

        match &self.inner {
            RegionInner::Mapped(m) => {
                let mapping = m.mapping.read();
                let bytes = mapping.bytes();
                #[allow(clippy::cast_possible_truncation)] // bounds checked above
                buf.copy_from_slice(&bytes[offset as usize..end as usize]);
            }
            RegionInner::Buffered(b) => {
                let mut file = b.file.lock();
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(buf)?;
            }
        }
        Ok(())
    }

    /// Writes `data` at `offset`, growing the region as needed.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on a read-only region; otherwise IO failures.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        if self.mode == RegionMode::ReadOnly {
            return Err(Error::InvalidArgument(
                "cannot write to a read-only region".to_string(),
            ));
        }
        let end = offset + data.len() as u64;
        self.ensure_len(end)?;

        match &self.inner {
            RegionInner::Mapped(m) => {
                let mut mapping = m.mapping.write();
                if let Mapping::ReadWrite(map) = &mut *mapping {
                    #[allow(clippy::cast_possible_truncation)] // grown above
                    map[offset as usize..end as usize].copy_from_slice(data);
                }
            }
            RegionInner::Buffered(b) => {
                let mut file = b.file.lock();
                file.seek(SeekFrom::Start(offset))?;
                file.write_all(data)?;
            }
        }
        Ok(())
    }

    /// Reads one float32 vector per offset.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unaligned or out-of-range offsets.
    pub fn read_vectors(&self, offsets: &[u64], dimension: usize) -> Result<Vec<Vec<f32>>> {
        let stride = dimension * std::mem::size_of::<f32>();
        let mut out = Vec::with_capacity(offsets.len());
        let mut buf = vec![0u8; stride];

        for &offset in offsets {
            check_alignment(offset)?;
            self.read_at(offset, &mut buf)?;
            out.push(
                buf.chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            );
        }
        Ok(out)
    }

    /// Writes one float32 vector per (offset, data) pair.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unaligned offsets or a read-only region.
    pub fn write_vectors(&self, writes: &[(u64, &[f32])]) -> Result<()> {
        for &(offset, vector) in writes {
            check_alignment(offset)?;
            let mut bytes = Vec::with_capacity(vector.len() * 4);
            for component in vector {
                bytes.extend_from_slice(&component.to_le_bytes());
            }
            self.write_at(offset, &bytes)?;
        }
        Ok(())
    }

    /// Flushes dirty pages (mmap) or buffered data (fallback) to disk.
    ///
    /// # Errors
    ///
    /// Surfaces flush and fsync failures.
    pub fn sync(&self) -> Result<()> {
        match &self.inner {
            RegionInner::Mapped(m) => {
                if let Mapping::ReadWrite(map) = &*m.mapping.read() {
                    map.flush()?;
                }
                Ok(())
            }
            RegionInner::Buffered(b) => {
                let file = b.file.lock();
                file.sync_all()?;
                Ok(())
            }
        }
    }
}

fn check_alignment(offset: u64) -> Result<()> {
    if offset % std::mem::align_of::<f32>() as u64 != 0 {
        return Err(Error::InvalidArgument(format!(
            "vector offset {offset} is not 4-byte aligned"
        )));
    }
    Ok(())
}
