//! Data directory management.
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK                    # Advisory lock for single-process access
//! └─ wal/
//!    ├─ 00000001.log         # Log segments
//!    ├─ manifest.json        # Log manifest
//!    ├─ snapshot.cbor        # Checkpoint blob
//!    └─ snapshot.meta.json   # Checkpoint metadata
//! ```
//!
//! The LOCK file is held with an exclusive `fs2` lock for as long as the
//! [`DataDir`] lives.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const WAL_DIR: &str = "wal";

/// An exclusively locked data directory.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens `path`, creating it (and the log directory) if allowed, and
    /// takes the directory lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDataDir`] if the directory is missing and
    /// `create_if_missing` is false or the path is not a directory, and
    /// [`CoreError::DataDirLocked`] if another process holds the lock.
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(CoreError::invalid_data_dir(format!(
                    "directory does not exist: {}",
                    path.display()
                )));
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_data_dir(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DataDirLocked);
        }

        fs::create_dir_all(path.join(WAL_DIR))?;
        tracing::debug!(path = %path.display(), "locked data directory");

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Root of the data directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding log segments and checkpoint files.
    #[must_use]
    pub fn wal_dir(&self) -> PathBuf {
        wal_dir(&self.path)
    }
}

/// Log directory for a data directory, without locking it. Used by
/// read-only tooling.
#[must_use]
pub fn wal_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(WAL_DIR)
}
