//! Engine configuration.

use lodekv_storage::DEFAULT_SEGMENT_SIZE;
use std::path::PathBuf;

/// Thresholds controlling when [`crate::snapshot::SnapshotScheduler`] takes
/// a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSchedulerOptions {
    /// No snapshot is taken until the log has reached this sequence number.
    pub min_seq_to_start: u64,
    /// Minimum number of records appended since the previous snapshot.
    pub min_seq_delta: u64,
}

impl Default for SnapshotSchedulerOptions {
    fn default() -> Self {
        Self {
            min_seq_to_start: 1,
            min_seq_delta: 10_000,
        }
    }
}

impl SnapshotSchedulerOptions {
    /// Sets the first sequence number at which snapshots may start.
    #[must_use]
    pub const fn min_seq_to_start(mut self, seq: u64) -> Self {
        self.min_seq_to_start = seq;
        self
    }

    /// Sets how many records must accumulate between snapshots.
    #[must_use]
    pub const fn min_seq_delta(mut self, delta: u64) -> Self {
        self.min_seq_delta = delta;
        self
    }
}

/// Configuration for opening an [`crate::Engine`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory. The log and checkpoint files live in `<data_dir>/wal`.
    pub data_dir: PathBuf,

    /// Identifier stamped on locally generated timestamps.
    pub node_id: String,

    /// Create the data directory if it does not exist.
    pub create_if_missing: bool,

    /// Log segment rotation threshold in bytes (0 = default).
    pub segment_size_bytes: u64,

    /// Sync every log append to disk instead of only flushing.
    pub sync_on_append: bool,

    /// Checkpoint scheduling thresholds.
    pub snapshot: SnapshotSchedulerOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("lodekv-data"),
            node_id: uuid::Uuid::new_v4().to_string(),
            create_if_missing: true,
            segment_size_bytes: DEFAULT_SEGMENT_SIZE, // 32 MiB
            sync_on_append: false,
            snapshot: SnapshotSchedulerOptions::default(),
        }
    }
}

impl Config {
    /// Default configuration rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the node identifier.
    #[must_use]
    pub fn node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Sets whether to create a missing data directory.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the segment rotation threshold.
    #[must_use]
    pub const fn segment_size_bytes(mut self, bytes: u64) -> Self {
        self.segment_size_bytes = bytes;
        self
    }

    /// Sets whether each append is synced to disk.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }

    /// Sets snapshot scheduling thresholds.
    #[must_use]
    pub const fn snapshot(mut self, options: SnapshotSchedulerOptions) -> Self {
        self.snapshot = options;
        self
    }
}
