//! Write-ahead log.
//!
//! An append-only file of framed records:
//!
//! ```text
//! [len: u32 LE][seq: u64 LE][crc: u32 LE][kind: u8][payload: len bytes]
//! ```
//!
//! The CRC covers seq, kind, and payload. Replay scans from the start (or
//! the last checkpoint), groups records into `Begin .. Commit` batches,
//! and stops at the first invalid CRC, truncated frame, or unterminated
//! batch — everything after a torn write is discarded.

use crate::error::{Error, Result};
use crate::util::crc32;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Record type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordKind {
    /// Opens a mutation batch.
    Begin = 0,
    /// Full page image; payload is the encoded page.
    PageWrite = 1,
    /// Seals a mutation batch; earlier records in the batch are durable.
    Commit = 2,
    /// All prior records have been applied and synced to the page file.
    Checkpoint = 3,
}

impl TryFrom<u8> for WalRecordKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Begin),
            1 => Ok(Self::PageWrite),
            2 => Ok(Self::Commit),
            3 => Ok(Self::Checkpoint),
            other => Err(Error::IndexCorrupted(format!(
                "unknown WAL record kind {other}"
            ))),
        }
    }
}

/// A single log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Monotonic sequence number.
    pub seq: u64,
    /// Record type.
    pub kind: WalRecordKind,
    /// Record payload (page image for `PageWrite`, empty otherwise).
    pub payload: Vec<u8>,
}

const FRAME_HEADER: usize = 4 + 8 + 4 + 1;

/// Append-only write-ahead log.
pub struct Wal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl Wal {
    /// Opens (or creates) the log at `path`.
    ///
    /// # Errors
    ///
    /// Surfaces file open failures.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Appends a record. Not yet durable; call [`Wal::flush`].
    ///
    /// # Errors
    ///
    /// Surfaces write failures.
    pub fn append(&self, record: &WalRecord) -> Result<()> {
        let mut writer = self.writer.lock();
        let mut crc_input = Vec::with_capacity(9 + record.payload.len());
        crc_input.extend_from_slice(&record.seq.to_le_bytes());
        crc_input.push(record.kind as u8);
        crc_input.extend_from_slice(&record.payload);
        let crc = crc32(&crc_input);

        #[allow(clippy::cast_possible_truncation)] // payloads are page-sized
        let len = record.payload.len() as u32;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&record.seq.to_le_bytes())?;
        writer.write_all(&crc.to_le_bytes())?;
        writer.write_all(&[record.kind as u8])?;
        writer.write_all(&record.payload)?;
        Ok(())
    }

    /// Flushes buffered records and fsyncs the log file.
    ///
    /// # Errors
    ///
    /// Surfaces flush and fsync failures.
    pub fn flush(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Truncates the log after a checkpoint has made it redundant.
    ///
    /// # Errors
    ///
    /// Surfaces truncation failures.
    pub fn reset(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(0)?;
        file.sync_all()?;
        *writer = BufWriter::new(OpenOptions::new().append(true).open(&self.path)?);
        debug!(path = %self.path.display(), "wal reset after checkpoint");
        Ok(())
    }

    /// Reads all valid records from a log file.
    ///
    /// Stops silently at the first torn or corrupt frame; records after
    /// the last checkpoint are the only ones returned.
    ///
    /// # Errors
    ///
    /// Surfaces file read failures; corruption is not an error here.
    pub fn replay(path: &Path) -> Result<Vec<WalRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;

        let mut records = Vec::new();
        let mut pos = 0usize;

        while pos + FRAME_HEADER <= bytes.len() {
            let len =
                u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap_or([0; 4])) as usize;
            let seq = u64::from_le_bytes(bytes[pos + 4..pos + 12].try_into().unwrap_or([0; 8]));
            let stored_crc =
                u32::from_le_bytes(bytes[pos + 12..pos + 16].try_into().unwrap_or([0; 4]));
            let kind_byte = bytes[pos + 16];

            let payload_start = pos + FRAME_HEADER;
            let payload_end = payload_start + len;
            if payload_end > bytes.len() {
                warn!(offset = pos, "wal truncated mid-record, discarding tail");
                break;
            }

            let Ok(kind) = WalRecordKind::try_from(kind_byte) else {
                warn!(offset = pos, "wal record has unknown kind, discarding tail");
                break;
            };

            let payload = &bytes[payload_start..payload_end];
            let mut crc_input = Vec::with_capacity(9 + len);
            crc_input.extend_from_slice(&seq.to_le_bytes());
            crc_input.push(kind_byte);
            crc_input.extend_from_slice(payload);
            if crc32(&crc_input) != stored_crc {
                warn!(offset = pos, seq, "wal record CRC mismatch, discarding tail");
                break;
            }

            if kind == WalRecordKind::Checkpoint {
                // Everything before the checkpoint is already in the page file.
                records.clear();
            } else {
                records.push(WalRecord {
                    seq,
                    kind,
                    payload: payload.to_vec(),
                });
            }
            pos = payload_end;
        }

        // Drop a trailing batch with no commit.
        if let Some(last_begin) = records
            .iter()
            .rposition(|r| r.kind == WalRecordKind::Begin)
        {
            let committed = records[last_begin..]
                .iter()
                .any(|r| r.kind == WalRecordKind::Commit);
            if !committed {
                warn!(seq = records[last_begin].seq, "discarding uncommitted wal batch");
                records.truncate(last_begin);
            }
        }

        Ok(records)
    }
}
