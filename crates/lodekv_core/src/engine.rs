//! The engine: one data directory, one store, one log.
//!
//! ```rust,no_run
//! use lodekv_core::{Config, Engine};
//!
//! let engine = Engine::open(Config::new("data").node_id("node-a"))?;
//! engine.put("app/greeting", "hello")?;
//! assert_eq!(engine.get(b"app/greeting").as_deref(), Some(&b"hello"[..]));
//!
//! let items = engine.get_by_prefix(b"app/");
//! engine.run_scheduler_once()?;
//! # drop(items);
//! # Ok::<(), lodekv_core::CoreError>(())
//! ```

use crate::changelog::ChangeLog;
use crate::clock::{HybridClock, TimestampSource};
use crate::config::Config;
use crate::dir::DataDir;
use crate::error::{CoreError, CoreResult};
use crate::lease::LeaseSnapshotBackend;
use crate::snapshot::{SnapshotManager, SnapshotMeta, SnapshotScheduler};
use crate::store::{ChangePublisher, NoopPublisher, ReplicatedKvStore};
use crate::types::{ChangeRecord, KvItem};
use bytes::Bytes;
use lodekv_storage::{LogOptions, SegmentedLog};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Pluggable collaborators for [`Engine::open_with_hooks`].
#[derive(Clone)]
pub struct EngineHooks {
    /// Notified of every change that takes effect.
    pub publisher: Arc<dyn ChangePublisher>,
    /// Lease state to include in checkpoints.
    pub leases: Option<Arc<dyn LeaseSnapshotBackend>>,
    /// Timestamp source; a [`HybridClock`] for the configured node when
    /// `None`.
    pub clock: Option<Arc<dyn TimestampSource>>,
}

impl Default for EngineHooks {
    fn default() -> Self {
        Self {
            publisher: Arc::new(NoopPublisher),
            leases: None,
            clock: None,
        }
    }
}

impl EngineHooks {
    /// Sets the change publisher.
    #[must_use]
    pub fn publisher(mut self, publisher: Arc<dyn ChangePublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Sets the lease backend.
    #[must_use]
    pub fn leases(mut self, leases: Arc<dyn LeaseSnapshotBackend>) -> Self {
        self.leases = Some(leases);
        self
    }

    /// Sets the timestamp source.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn TimestampSource>) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl std::fmt::Debug for EngineHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHooks")
            .field("leases", &self.leases.is_some())
            .field("clock", &self.clock.is_some())
            .finish_non_exhaustive()
    }
}

/// Point-in-time figures about an open engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Node identifier.
    pub node_id: String,
    /// Highest log sequence number.
    pub last_seq: u64,
    /// Highest revision assigned.
    pub last_revision: u64,
    /// Number of log segment files.
    pub segments: usize,
    /// Total bytes across log segments.
    pub log_bytes: u64,
    /// Stored items, tombstones included.
    pub items: usize,
    /// Keys with a live value.
    pub live_keys: usize,
    /// Bytes held by the prefix index arena.
    pub index_arena_bytes: usize,
    /// Log offset covered by the newest checkpoint.
    pub last_snapshot_seq: u64,
}

/// What [`Engine::open`] found on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Checkpoint loaded before replay, if any.
    pub snapshot: Option<SnapshotMeta>,
    /// Log records replayed on top of it.
    pub replayed: usize,
}

/// An open key-value engine.
pub struct Engine {
    config: Config,
    store: Arc<ReplicatedKvStore>,
    snapshots: Arc<SnapshotManager>,
    scheduler: SnapshotScheduler,
    recovery: RecoveryReport,
    // Dropped last so the lock outlives every open file.
    _dir: DataDir,
}

impl Engine {
    /// Opens the engine with default hooks.
    ///
    /// # Errors
    ///
    /// See [`Engine::open_with_hooks`].
    pub fn open(config: Config) -> CoreResult<Self> {
        Self::open_with_hooks(config, EngineHooks::default())
    }

    /// Opens the engine: locks the data directory, opens the log, loads the
    /// newest checkpoint if one is readable and replays the log after it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DataDirLocked`] if another process has the
    /// directory open, [`CoreError::InvalidConfig`] for an empty node id or
    /// a segment size too small for a frame, or an I/O error.
    pub fn open_with_hooks(config: Config, hooks: EngineHooks) -> CoreResult<Self> {
        if config.node_id.is_empty() {
            return Err(CoreError::invalid_config("node_id must not be empty"));
        }

        let dir = DataDir::open(&config.data_dir, config.create_if_missing)?;
        let wal_dir = dir.wal_dir();

        let log = SegmentedLog::open_with_options(
            &wal_dir,
            LogOptions::new()
                .segment_size_bytes(config.segment_size_bytes)
                .sync_on_append(config.sync_on_append),
        )
        .map_err(|e| match e {
            lodekv_storage::StorageError::InvalidConfig(message) => CoreError::invalid_config(message),
            other => other.into(),
        })?;
        let changelog = Arc::new(ChangeLog::open(log)?);

        let clock = hooks
            .clock
            .unwrap_or_else(|| Arc::new(HybridClock::new(config.node_id.clone())));
        let store = Arc::new(ReplicatedKvStore::new(changelog.clone(), clock, hooks.publisher));

        let mut manager = SnapshotManager::new(store.clone(), &wal_dir, config.node_id.clone());
        if let Some(leases) = hooks.leases {
            manager = manager.with_leases(leases);
        }
        let snapshots = Arc::new(manager);

        let snapshot = snapshots.load()?;
        let after_seq = snapshot.as_ref().map_or(0, |meta| meta.last_wal_offset);
        let replayed = changelog.replay_from_seq(after_seq, |_, record| {
            store.apply(&record);
            Ok(())
        })?;

        tracing::info!(
            path = %config.data_dir.display(),
            node = %config.node_id,
            snapshot = snapshot.is_some(),
            replayed,
            items = store.len(),
            last_seq = changelog.last_seq(),
            last_revision = changelog.last_revision(),
            "engine opened"
        );

        let scheduler = SnapshotScheduler::new(snapshots.clone(), config.snapshot, after_seq);
        Ok(Self {
            config,
            store,
            snapshots,
            scheduler,
            recovery: RecoveryReport { snapshot, replayed },
            _dir: dir,
        })
    }

    /// Sets `key` to `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log append fails.
    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> CoreResult<ChangeRecord> {
        self.store.put(key, value)
    }

    /// Deletes `key`. Deleting an absent key still logs a tombstone.
    ///
    /// # Errors
    ///
    /// Returns an error if the log append fails.
    pub fn delete(&self, key: impl Into<Bytes>) -> CoreResult<ChangeRecord> {
        self.store.delete(key)
    }

    /// Live value of `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.store.get(key)
    }

    /// Live items under `prefix`, in key order.
    #[must_use]
    pub fn get_by_prefix(&self, prefix: &[u8]) -> Vec<KvItem> {
        self.store.get_by_prefix(prefix)
    }

    /// Writes `value` if `key` is at `expected_revision` (0 = absent).
    ///
    /// # Errors
    ///
    /// Returns an error if the log append fails.
    pub fn compare_and_set(
        &self,
        key: impl Into<Bytes>,
        expected_revision: u64,
        value: impl Into<Bytes>,
    ) -> CoreResult<Option<u64>> {
        self.store.try_compare_and_set(key, expected_revision, value)
    }

    /// Deletes `key` if it is at `expected_revision`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log append fails.
    pub fn compare_and_delete(&self, key: impl Into<Bytes>, expected_revision: u64) -> CoreResult<Option<u64>> {
        self.store.try_compare_and_delete(key, expected_revision)
    }

    /// Logs and applies a change received from a peer.
    ///
    /// # Errors
    ///
    /// Returns an error if the log append fails.
    pub fn apply_remote(&self, record: ChangeRecord) -> CoreResult<(ChangeRecord, bool)> {
        self.store.apply_replicated(record)
    }

    /// Logged changes with `revision > from_revision`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn read_after(&self, from_revision: u64) -> CoreResult<Vec<ChangeRecord>> {
        self.store.changelog().read_after(from_revision)
    }

    /// Every stored item, tombstones included.
    #[must_use]
    pub fn export_all(&self) -> Vec<KvItem> {
        self.store.export_all()
    }

    /// Takes a checkpoint now.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be written.
    pub fn snapshot(&self) -> CoreResult<SnapshotMeta> {
        self.scheduler.force()
    }

    /// Takes a checkpoint if the configured thresholds are met.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be written.
    pub fn run_scheduler_once(&self) -> CoreResult<Option<SnapshotMeta>> {
        self.scheduler.run_once()
    }

    /// Current figures.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let changelog = self.store.changelog();
        let (last_seq, last_revision) = changelog.position();
        let segments = changelog.segments();
        EngineStats {
            node_id: self.config.node_id.clone(),
            last_seq,
            last_revision,
            log_bytes: segments.iter().map(|s| s.len_bytes).sum(),
            segments: segments.len(),
            items: self.store.len(),
            live_keys: self.store.live_len(),
            index_arena_bytes: self.store.index().arena_bytes(),
            last_snapshot_seq: self.scheduler.last_snapshot_seq(),
        }
    }

    /// What was recovered on open.
    #[must_use]
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<ReplicatedKvStore> {
        &self.store
    }

    /// The checkpoint manager.
    #[must_use]
    pub fn snapshots(&self) -> &Arc<SnapshotManager> {
        &self.snapshots
    }

    /// Configuration the engine was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Root data directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.data_dir
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.config.data_dir)
            .field("node_id", &self.config.node_id)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
