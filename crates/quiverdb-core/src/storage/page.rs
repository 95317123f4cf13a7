//! Fixed-size pages with typed, CRC-protected headers.
//!
//! Every page except page zero carries a 16-byte header:
//!
//! ```text
//! [id: u32 LE][type: u8][pad: u8][size_in_use: u16 LE][seq: u32 LE][crc: u32 LE]
//! ```
//!
//! The CRC covers the header minus its own field, plus the payload. Page
//! zero is the file header: magic, schema version, page size, and the
//! free-list root pointer.

use crate::error::{Error, Result};
use crate::util::crc32;

/// Size of the per-page header in bytes.
pub const PAGE_HEADER_SIZE: usize = 16;

/// File header magic (page zero).
pub const FILE_MAGIC: &[u8; 4] = b"QVRP";

/// On-disk schema version.
pub const SCHEMA_VERSION: u16 = 1;

/// Page type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    /// File header (page zero only).
    Header = 0,
    /// Collection metadata documents.
    Metadata = 1,
    /// Vector payload data.
    VectorLeaf = 2,
    /// Index node data.
    IndexNode = 3,
    /// Continuation of an oversized record.
    Overflow = 4,
    /// Free-list bookkeeping.
    FreeList = 5,
}

impl TryFrom<u8> for PageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Header),
            1 => Ok(Self::Metadata),
            2 => Ok(Self::VectorLeaf),
            3 => Ok(Self::IndexNode),
            4 => Ok(Self::Overflow),
            5 => Ok(Self::FreeList),
            other => Err(Error::IndexCorrupted(format!(
                "unknown page type tag {other}"
            ))),
        }
    }
}

/// A single fixed-size page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Page id; the byte offset is `id * page_size`.
    pub id: u32,
    /// Type tag.
    pub page_type: PageType,
    /// Sequence number of the mutation that last wrote this page
    /// (low 32 bits of the WAL sequence).
    pub seq: u32,
    /// Bytes of the payload actually in use.
    pub size_in_use: u16,
    /// Payload; length is `page_size - PAGE_HEADER_SIZE`.
    pub payload: Vec<u8>,
}

impl Page {
    /// Creates a page, padding or truncating `data` to the payload size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `data` exceeds the payload
    /// capacity of a page.
    #[allow(clippy::cast_possible_truncation)] // capacity <= 65520
    pub fn new(id: u32, page_type: PageType, seq: u32, data: &[u8], page_size: u32) -> Result<Self> {
        let capacity = payload_capacity(page_size);
        if data.len() > capacity {
            return Err(Error::InvalidArgument(format!(
                "page payload of {} bytes exceeds capacity {capacity}",
                data.len()
            )));
        }
        let mut payload = vec![0u8; capacity];
        payload[..data.len()].copy_from_slice(data);
        Ok(Self {
            id,
            page_type,
            seq,
            size_in_use: data.len() as u16,
            payload,
        })
    }

    /// Returns the in-use prefix of the payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.payload[..self.size_in_use as usize]
    }

    /// Encodes the page into `page_size` bytes, computing the CRC.
    #[must_use]
    pub fn encode(&self, page_size: u32) -> Vec<u8> {
        let mut buf = vec![0u8; page_size as usize];
        buf[0..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4] = self.page_type as u8;
        buf[5] = 0;
        buf[6..8].copy_from_slice(&self.size_in_use.to_le_bytes());
        buf[8..12].copy_from_slice(&self.seq.to_le_bytes());

        let payload_len = payload_capacity(page_size).min(self.payload.len());
        buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + payload_len]
            .copy_from_slice(&self.payload[..payload_len]);

        let crc = page_crc(&buf);
        buf[12..16].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes and validates a page from `page_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexCorrupted`] on a short buffer, unknown type
    /// tag, out-of-range `size_in_use`, or CRC mismatch.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PAGE_HEADER_SIZE {
            return Err(Error::IndexCorrupted("page shorter than header".to_string()));
        }

        let id = u32::from_le_bytes(bytes[0..4].try_into().unwrap_or([0; 4]));
        let page_type = PageType::try_from(bytes[4])?;
        let size_in_use = u16::from_le_bytes(bytes[6..8].try_into().unwrap_or([0; 2]));
        let seq = u32::from_le_bytes(bytes[8..12].try_into().unwrap_or([0; 4]));
        let stored_crc = u32::from_le_bytes(bytes[12..16].try_into().unwrap_or([0; 4]));

        if page_crc(bytes) != stored_crc {
            return Err(Error::IndexCorrupted(format!("page {id} CRC mismatch")));
        }

        let payload = bytes[PAGE_HEADER_SIZE..].to_vec();
        if size_in_use as usize > payload.len() {
            return Err(Error::IndexCorrupted(format!(
                "page {id} size_in_use {size_in_use} exceeds payload"
            )));
        }

        Ok(Self {
            id,
            page_type,
            seq,
            size_in_use,
            payload,
        })
    }
}

/// Payload bytes available in a page of the given size.
#[must_use]
pub fn payload_capacity(page_size: u32) -> usize {
    (page_size as usize).saturating_sub(PAGE_HEADER_SIZE)
}

/// CRC over the header (minus the CRC field) and payload.
fn page_crc(buf: &[u8]) -> u32 {
    let mut hasher_input = Vec::with_capacity(buf.len() - 4);
    hasher_input.extend_from_slice(&buf[0..12]);
    hasher_input.extend_from_slice(&buf[PAGE_HEADER_SIZE..]);
    crc32(&hasher_input)
}

/// Page-zero file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Schema version of the file.
    pub schema_version: u16,
    /// Page size the file was created with.
    pub page_size: u32,
    /// Page id of the free-list root.
    pub free_list_root: u32,
}

impl FileHeader {
    /// Encodes the header into a full page-zero image.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.page_size as usize];
        buf[0..4].copy_from_slice(FILE_MAGIC);
        buf[4..6].copy_from_slice(&self.schema_version.to_le_bytes());
        buf[6..10].copy_from_slice(&self.page_size.to_le_bytes());
        buf[10..14].copy_from_slice(&self.free_list_root.to_le_bytes());
        let crc = crc32(&buf[0..14]);
        buf[14..18].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes and validates page zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexCorrupted`] on bad magic, CRC, or an
    /// implausible page size.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 18 {
            return Err(Error::IndexCorrupted("file header too short".to_string()));
        }
        if &bytes[0..4] != FILE_MAGIC {
            return Err(Error::IndexCorrupted(
                "page file has wrong magic".to_string(),
            ));
        }
        let stored_crc = u32::from_le_bytes(bytes[14..18].try_into().unwrap_or([0; 4]));
        if crc32(&bytes[0..14]) != stored_crc {
            return Err(Error::IndexCorrupted("file header CRC mismatch".to_string()));
        }

        let schema_version = u16::from_le_bytes(bytes[4..6].try_into().unwrap_or([0; 2]));
        let page_size = u32::from_le_bytes(bytes[6..10].try_into().unwrap_or([0; 4]));
        if !(512..=65536).contains(&page_size) || !page_size.is_power_of_two() {
            return Err(Error::IndexCorrupted(format!(
                "file header has implausible page size {page_size}"
            )));
        }
        let free_list_root = u32::from_le_bytes(bytes[10..14].try_into().unwrap_or([0; 4]));

        Ok(Self {
            schema_version,
            page_size,
            free_list_root,
        })
    }
}
