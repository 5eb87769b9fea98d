//! Error types for the storage layer.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing the log.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of a file.
    #[error("read beyond end of file: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current file size.
        size: u64,
    },

    /// A payload exceeds the per-record limit.
    #[error("record of {len} bytes exceeds the {max} byte limit")]
    RecordTooLarge {
        /// Payload length that was rejected.
        len: usize,
        /// The configured maximum.
        max: usize,
    },

    /// The log manifest could not be parsed or written.
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// On-disk state is inconsistent in a way that cannot be repaired locally.
    #[error("log corrupted: {0}")]
    Corrupted(String),

    /// The log was opened with unusable options.
    #[error("invalid log configuration: {0}")]
    InvalidConfig(String),
}
