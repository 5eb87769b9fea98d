//! The `manifest.json` file describing a log directory.

use crate::error::StorageResult;
use crate::fsutil;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the manifest inside the log directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Persisted summary of the log.
///
/// Serialized with PascalCase keys:
///
/// ```json
/// {"CurrentSegmentId":3,"LastSeq":1200,"SegmentSizeBytes":33554432}
/// ```
///
/// The manifest is advisory: on open every segment file is re-scanned and
/// the scan wins wherever the two disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogManifest {
    /// Segment receiving appends.
    pub current_segment_id: u64,
    /// Highest sequence number written.
    pub last_seq: u64,
    /// Rotation threshold in bytes.
    pub segment_size_bytes: u64,
}

impl LogManifest {
    /// Path of the manifest in `dir`.
    #[must_use]
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Loads the manifest, returning `None` when none has been written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(dir: &Path) -> StorageResult<Option<Self>> {
        match fs::read(Self::path(dir)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the manifest atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file replacement fails.
    pub fn save(&self, dir: &Path) -> StorageResult<()> {
        let bytes = serde_json::to_vec(self)?;
        fsutil::write_atomic(&Self::path(dir), &bytes)
    }

    /// Replaces the manifest via rename without forcing it to disk.
    ///
    /// Used on the append path: a lost update is repaired by the segment
    /// scan on the next open.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, the write or the rename fails.
    pub fn save_relaxed(&self, dir: &Path) -> StorageResult<()> {
        let path = Self::path(dir);
        let tmp = fsutil::tmp_path(&path);
        fs::write(&tmp, serde_json::to_vec(self)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
