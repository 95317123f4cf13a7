//! Error types for `QuiverDB`.
//!
//! A single unified error type covers all engine operations. Each variant
//! carries a stable machine-readable code (`QVR-NNN`) and maps onto a
//! coarse [`ErrorKind`] that callers can branch on.

use thiserror::Error;

/// Result type alias for `QuiverDB` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification exposed to callers.
///
/// Kinds are stable across releases; the concrete [`Error`] variants are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: bad dimensions, bad k, bad metric, bad name.
    InvalidArgument,
    /// Missing id or missing collection.
    NotFound,
    /// Insert with an id that already exists.
    DuplicateId,
    /// Vector length differs from the collection dimension.
    DimensionMismatch,
    /// Integrity check failed on load; the collection refuses operations.
    IndexCorruption,
    /// Page write, log write, or fsync failed after retries.
    StorageFailure,
    /// External embedding provider failed on every path.
    ProviderFailure,
    /// Operation cancelled before completion.
    Cancelled,
    /// Non-blocking submission while the queue is saturated.
    Busy,
}

/// Errors that can occur in `QuiverDB` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Collection already exists (QVR-001).
    #[error("[QVR-001] Collection '{0}' already exists")]
    CollectionExists(String),

    /// Collection not found (QVR-002).
    #[error("[QVR-002] Collection '{0}' not found")]
    CollectionNotFound(String),

    /// Vector not found (QVR-003).
    #[error("[QVR-003] Vector with id '{0}' not found")]
    VectorNotFound(String),

    /// Duplicate vector id (QVR-004).
    #[error("[QVR-004] Vector with id '{0}' already exists")]
    DuplicateId(String),

    /// Dimension mismatch (QVR-005).
    #[error("[QVR-005] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Invalid argument (QVR-006).
    #[error("[QVR-006] Invalid argument: {0}")]
    InvalidArgument(String),

    /// Index corrupted (QVR-007).
    ///
    /// Index or page files failed integrity validation and must be rebuilt.
    #[error("[QVR-007] Index corrupted: {0}")]
    IndexCorrupted(String),

    /// Storage failure (QVR-008).
    #[error("[QVR-008] Storage failure: {0}")]
    Storage(String),

    /// Embedding provider failure (QVR-009).
    #[error("[QVR-009] Embedding provider failure: {0}")]
    Provider(String),

    /// Operation cancelled (QVR-010).
    #[error("[QVR-010] Operation cancelled")]
    Cancelled,

    /// Engine busy (QVR-011).
    #[error("[QVR-011] Busy: {0}")]
    Busy(String),

    /// IO error (QVR-012).
    #[error("[QVR-012] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (QVR-013).
    #[error("[QVR-013] Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (QVR-014).
    #[error("[QVR-014] Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the stable error code (e.g., "QVR-005").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CollectionExists(_) => "QVR-001",
            Self::CollectionNotFound(_) => "QVR-002",
            Self::VectorNotFound(_) => "QVR-003",
            Self::DuplicateId(_) => "QVR-004",
            Self::DimensionMismatch { .. } => "QVR-005",
            Self::InvalidArgument(_) => "QVR-006",
            Self::IndexCorrupted(_) => "QVR-007",
            Self::Storage(_) => "QVR-008",
            Self::Provider(_) => "QVR-009",
            Self::Cancelled => "QVR-010",
            Self::Busy(_) => "QVR-011",
            Self::Io(_) => "QVR-012",
            Self::Serialization(_) => "QVR-013",
            Self::Config(_) => "QVR-014",
        }
    }

    /// Returns the coarse classification for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CollectionExists(_) | Self::DuplicateId(_) => ErrorKind::DuplicateId,
            Self::CollectionNotFound(_) | Self::VectorNotFound(_) => ErrorKind::NotFound,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::InvalidArgument(_) | Self::Config(_) => ErrorKind::InvalidArgument,
            Self::IndexCorrupted(_) => ErrorKind::IndexCorruption,
            Self::Storage(_) | Self::Io(_) | Self::Serialization(_) => ErrorKind::StorageFailure,
            Self::Provider(_) => ErrorKind::ProviderFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Busy(_) => ErrorKind::Busy,
        }
    }

    /// Returns true if the operation may be retried.
    ///
    /// Corruption and malformed-input errors are never retried.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StorageFailure | ErrorKind::ProviderFailure | ErrorKind::Busy
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
