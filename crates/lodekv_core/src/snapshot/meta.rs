//! `snapshot.meta.json`: a small sidecar describing the checkpoint blob.

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name of the CBOR checkpoint blob.
pub const SNAPSHOT_FILE: &str = "snapshot.cbor";

/// File name of the JSON metadata sidecar.
pub const META_FILE: &str = "snapshot.meta.json";

/// Checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnapshotMeta {
    /// Highest revision assigned when the checkpoint was taken.
    pub last_revision: u64,
    /// Log sequence number covered by the checkpoint.
    pub last_wal_offset: u64,
    /// Node that wrote the checkpoint.
    pub created_by_node: String,
}

impl SnapshotMeta {
    /// Serializes to the on-disk JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parses the on-disk JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a complete metadata object.
    pub fn from_json(bytes: &[u8]) -> CoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Reads the metadata sidecar from `dir`, returning `None` if there is no
/// checkpoint.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read_meta(dir: &Path) -> CoreResult<Option<SnapshotMeta>> {
    let path = dir.join(META_FILE);
    if !path.exists() {
        return Ok(None);
    }
    SnapshotMeta::from_json(&fs::read(path)?).map(Some)
}
