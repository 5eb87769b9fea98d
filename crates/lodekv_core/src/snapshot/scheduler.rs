//! Threshold-based checkpoint trigger.
//!
//! The scheduler owns no thread. Call [`SnapshotScheduler::run_once`] from
//! whatever periodic loop the host already has.

use super::{SnapshotManager, SnapshotMeta};
use crate::config::SnapshotSchedulerOptions;
use crate::error::CoreResult;
use parking_lot::Mutex;
use std::sync::Arc;

/// Decides when enough log has accumulated to be worth a checkpoint.
#[derive(Debug)]
pub struct SnapshotScheduler {
    manager: Arc<SnapshotManager>,
    options: SnapshotSchedulerOptions,
    last_snapshot_seq: Mutex<u64>,
}

impl SnapshotScheduler {
    /// Creates a scheduler. `last_snapshot_seq` is the log offset of the
    /// checkpoint currently on disk, or 0.
    #[must_use]
    pub fn new(manager: Arc<SnapshotManager>, options: SnapshotSchedulerOptions, last_snapshot_seq: u64) -> Self {
        Self {
            manager,
            options,
            last_snapshot_seq: Mutex::new(last_snapshot_seq),
        }
    }

    /// Takes a checkpoint if the log has reached `min_seq_to_start` and at
    /// least `min_seq_delta` records were appended since the last one.
    ///
    /// Returns the new checkpoint's metadata, or `None` if thresholds were
    /// not met.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint fails; the threshold state is not
    /// advanced.
    pub fn run_once(&self) -> CoreResult<Option<SnapshotMeta>> {
        let mut last_snapshot_seq = self.last_snapshot_seq.lock();
        let last_seq = self.manager.store().changelog().last_seq();

        if last_seq < self.options.min_seq_to_start
            || last_seq.saturating_sub(*last_snapshot_seq) < self.options.min_seq_delta
        {
            tracing::trace!(last_seq, last_snapshot_seq = *last_snapshot_seq, "snapshot not due");
            return Ok(None);
        }

        let meta = self.manager.create_snapshot()?;
        *last_snapshot_seq = meta.last_wal_offset;
        Ok(Some(meta))
    }

    /// Takes a checkpoint regardless of thresholds.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint fails.
    pub fn force(&self) -> CoreResult<SnapshotMeta> {
        let mut last_snapshot_seq = self.last_snapshot_seq.lock();
        let meta = self.manager.create_snapshot()?;
        *last_snapshot_seq = meta.last_wal_offset;
        Ok(meta)
    }

    /// Log offset covered by the most recent checkpoint.
    #[must_use]
    pub fn last_snapshot_seq(&self) -> u64 {
        *self.last_snapshot_seq.lock()
    }

    /// Configured thresholds.
    #[must_use]
    pub fn options(&self) -> SnapshotSchedulerOptions {
        self.options
    }
}
