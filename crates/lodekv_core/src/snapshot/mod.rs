//! Checkpoints of the store, used to bound log growth.
//!
//! A checkpoint is two files in the log directory:
//!
//! ```text
//! <wal>/
//! ├─ snapshot.cbor        # items (and leases) as of last_log_offset
//! └─ snapshot.meta.json   # {"LastRevision", "LastWalOffset", "CreatedByNode"}
//! ```
//!
//! Both are staged as `.tmp` siblings, synced, then renamed into place.
//! Once the checkpoint is durable, log segments it fully covers are deleted.
//! Recovery loads the checkpoint and replays the log records after
//! `last_log_offset`.

pub mod format;
mod meta;
mod scheduler;

pub use format::SnapshotBlob;
pub use meta::{read_meta, SnapshotMeta, META_FILE, SNAPSHOT_FILE};
pub use scheduler::SnapshotScheduler;

use crate::error::CoreResult;
use crate::lease::LeaseSnapshotBackend;
use crate::store::ReplicatedKvStore;
use lodekv_storage::fsutil;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes and loads checkpoints for one store.
pub struct SnapshotManager {
    store: Arc<ReplicatedKvStore>,
    dir: PathBuf,
    node_id: String,
    leases: Option<Arc<dyn LeaseSnapshotBackend>>,
    lock: Mutex<()>,
}

impl SnapshotManager {
    /// Creates a manager keeping its files in `dir` (normally the log
    /// directory).
    pub fn new(store: Arc<ReplicatedKvStore>, dir: impl Into<PathBuf>, node_id: impl Into<String>) -> Self {
        Self {
            store,
            dir: dir.into(),
            node_id: node_id.into(),
            leases: None,
            lock: Mutex::new(()),
        }
    }

    /// Attaches a lease backend whose state is checkpointed alongside the
    /// items.
    #[must_use]
    pub fn with_leases(mut self, leases: Arc<dyn LeaseSnapshotBackend>) -> Self {
        self.leases = Some(leases);
        self
    }

    /// Takes a checkpoint and deletes the log segments it covers.
    ///
    /// The log position is read before the items are exported. Records
    /// appended in between may appear in the export as well; replaying them
    /// on load is idempotent under last-writer-wins.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or any file operation fails. A failure
    /// before the renames leaves the previous checkpoint in place.
    pub fn create_snapshot(&self) -> CoreResult<SnapshotMeta> {
        let _guard = self.lock.lock();
        let changelog = self.store.changelog();

        let (last_seq, last_revision) = changelog.position();
        let blob = SnapshotBlob {
            last_log_offset: last_seq,
            items: self.store.export_all(),
            leases: self
                .leases
                .as_ref()
                .map(|backend| backend.export_leases())
                .filter(|entries| !entries.is_empty()),
        };
        let meta = SnapshotMeta {
            last_revision,
            last_wal_offset: last_seq,
            created_by_node: self.node_id.clone(),
        };

        let blob_bytes = format::encode(&blob)?;
        let meta_bytes = meta.to_json()?;

        let blob_path = self.snapshot_path();
        let meta_path = self.meta_path();
        fsutil::stage_tmp(&blob_path, &blob_bytes)?;
        fsutil::stage_tmp(&meta_path, &meta_bytes)?;
        fsutil::commit_tmp(&blob_path)?;
        fsutil::commit_tmp(&meta_path)?;
        fsutil::sync_dir(&self.dir)?;

        let collected = changelog.collect_segments(last_seq)?;
        tracing::info!(
            last_seq,
            last_revision,
            items = blob.items.len(),
            leases = blob.leases.as_ref().map_or(0, Vec::len),
            bytes = blob_bytes.len(),
            collected,
            "snapshot created"
        );
        Ok(meta)
    }

    /// Loads the checkpoint into the store if one is present and readable.
    ///
    /// Returns false when either file is missing or fails to parse; the
    /// store is not touched in that case.
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures other than a missing file.
    pub fn try_load(&self) -> CoreResult<bool> {
        Ok(self.load()?.is_some())
    }

    /// Like [`Self::try_load`], returning the metadata of the loaded
    /// checkpoint. `last_wal_offset` is the sequence number replay should
    /// continue after.
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures other than a missing file.
    pub fn load(&self) -> CoreResult<Option<SnapshotMeta>> {
        let _guard = self.lock.lock();

        let Some(blob_bytes) = read_if_exists(&self.snapshot_path())? else {
            return Ok(None);
        };
        let Some(meta_bytes) = read_if_exists(&self.meta_path())? else {
            tracing::warn!(dir = %self.dir.display(), "snapshot blob without metadata, ignoring");
            return Ok(None);
        };

        let parsed = SnapshotMeta::from_json(&meta_bytes)
            .and_then(|meta| format::decode(&blob_bytes).map(|blob| (meta, blob)));
        let (mut meta, blob) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, dir = %self.dir.display(), "unreadable snapshot, ignoring");
                return Ok(None);
            }
        };

        if meta.last_wal_offset != blob.last_log_offset {
            tracing::warn!(
                meta_offset = meta.last_wal_offset,
                blob_offset = blob.last_log_offset,
                "snapshot metadata disagrees with blob, using blob offset"
            );
            meta.last_wal_offset = blob.last_log_offset;
        }

        let items = blob.items.len();
        for item in blob.items {
            self.store.apply(&item.into_record());
        }
        match (blob.leases, &self.leases) {
            (Some(entries), Some(backend)) => backend.restore_leases(entries),
            (Some(entries), None) if !entries.is_empty() => {
                tracing::warn!(leases = entries.len(), "snapshot has leases but no lease backend is attached");
            }
            _ => {}
        }
        self.store.changelog().observe_revision(meta.last_revision);

        tracing::info!(
            items,
            last_revision = meta.last_revision,
            last_wal_offset = meta.last_wal_offset,
            created_by = %meta.created_by_node,
            "snapshot loaded"
        );
        Ok(Some(meta))
    }

    /// Metadata of the current checkpoint, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata file exists but cannot be parsed.
    pub fn read_meta(&self) -> CoreResult<Option<SnapshotMeta>> {
        read_meta(&self.dir)
    }

    /// Directory holding the checkpoint files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The store being checkpointed.
    #[must_use]
    pub fn store(&self) -> &Arc<ReplicatedKvStore> {
        &self.store
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }
}

impl std::fmt::Debug for SnapshotManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotManager")
            .field("dir", &self.dir)
            .field("node_id", &self.node_id)
            .field("leases", &self.leases.is_some())
            .finish_non_exhaustive()
    }
}

fn read_if_exists(path: &Path) -> CoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
