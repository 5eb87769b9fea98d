//! Crash-safe file replacement helpers.

use crate::error::StorageResult;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Replaces `path` with `bytes` so a crash leaves either the old or the new
/// content, never a mix.
///
/// The data goes to `<path>.tmp`, is synced, renamed over `path`, and the
/// parent directory is synced so the rename itself is durable.
///
/// # Errors
///
/// Returns an error if any step fails; a stale `.tmp` file may remain.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

/// Writes `bytes` to the temporary sibling of `path` and syncs it, without
/// renaming. Pair with [`commit_tmp`] when several files must be staged
/// before any of them becomes visible.
///
/// # Errors
///
/// Returns an error if the file cannot be written or synced.
pub fn stage_tmp(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut file = File::create(tmp_path(path))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Renames a file staged with [`stage_tmp`] over `path`.
///
/// # Errors
///
/// Returns an error if the rename fails.
pub fn commit_tmp(path: &Path) -> StorageResult<()> {
    fs::rename(tmp_path(path), path)?;
    Ok(())
}

/// Temporary sibling used while replacing `path`.
#[must_use]
pub fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Makes directory entry changes (create, rename, unlink) durable.
///
/// # Errors
///
/// Returns an error if the directory cannot be opened or synced.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> StorageResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// Directory sync is not available on this platform; NTFS journals
/// metadata updates itself.
///
/// # Errors
///
/// Never fails.
#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> StorageResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn staged_file_is_invisible_until_committed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.cbor");

        stage_tmp(&path, b"blob").unwrap();
        assert!(!path.exists());
        assert_eq!(tmp_path(&path), dir.path().join("snapshot.cbor.tmp"));

        commit_tmp(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"blob");
    }
}
