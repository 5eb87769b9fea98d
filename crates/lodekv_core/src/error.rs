//! Error types for lodekv core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error from the segmented log.
    #[error("storage error: {0}")]
    Storage(#[from] lodekv_storage::StorageError),

    /// I/O error outside the log (snapshots, data directory).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON metadata could not be read or written.
    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),

    /// A change record or snapshot blob could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// What was malformed.
        message: String,
    },

    /// The configuration is unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Which setting is wrong and why.
        message: String,
    },

    /// Another process holds the data directory.
    #[error("data directory locked: another process has exclusive access")]
    DataDirLocked,

    /// The data directory is missing or not a directory.
    #[error("invalid data directory: {message}")]
    InvalidDataDir {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid data directory error.
    pub fn invalid_data_dir(message: impl Into<String>) -> Self {
        Self::InvalidDataDir {
            message: message.into(),
        }
    }
}

impl From<ciborium::ser::Error<io::Error>> for CoreError {
    fn from(e: ciborium::ser::Error<io::Error>) -> Self {
        Self::codec(format!("CBOR encode: {e}"))
    }
}

impl From<ciborium::de::Error<io::Error>> for CoreError {
    fn from(e: ciborium::de::Error<io::Error>) -> Self {
        Self::codec(format!("CBOR decode: {e}"))
    }
}
