//! The replicated key-value state machine.
//!
//! Every change, whether written locally, received from a peer or replayed
//! from the log, goes through [`ReplicatedKvStore::apply`], which resolves
//! conflicts with last-writer-wins on [`HybridTimestamp`]s. A change is kept
//! only if its timestamp is strictly greater than the stored one; ties keep
//! what is already there, so replicas converge regardless of delivery
//! order.
//!
//! # Locking
//!
//! The map is a sharded [`DashMap`]. The LWW compare-and-replace and the
//! matching prefix index update happen while the key's shard entry is held,
//! so the index never disagrees with the map for a key. Lock order is always
//! map shard, then index. Prefix queries collect keys from the index first
//! and release it before touching the map.
//!
//! Local writes additionally take a store-wide write lock so that a
//! compare-and-swap check and the write it guards are atomic with respect
//! to other local writes.
//!
//! [`HybridTimestamp`]: crate::types::HybridTimestamp

mod publish;

pub use publish::{ChangeFeed, ChangePublisher, NoopPublisher};

use crate::changelog::ChangeLog;
use crate::clock::TimestampSource;
use crate::error::CoreResult;
use crate::index::RadixKeyIndex;
use crate::types::{ChangeRecord, KvItem};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// In-memory view of every key, kept in step with the change log.
pub struct ReplicatedKvStore {
    map: DashMap<Bytes, KvItem>,
    index: RadixKeyIndex,
    changelog: Arc<ChangeLog>,
    clock: Arc<dyn TimestampSource>,
    publisher: Arc<dyn ChangePublisher>,
    write_lock: Mutex<()>,
}

impl ReplicatedKvStore {
    /// Creates an empty store writing through `changelog`.
    pub fn new(
        changelog: Arc<ChangeLog>,
        clock: Arc<dyn TimestampSource>,
        publisher: Arc<dyn ChangePublisher>,
    ) -> Self {
        Self {
            map: DashMap::new(),
            index: RadixKeyIndex::new(),
            changelog,
            clock,
            publisher,
            write_lock: Mutex::new(()),
        }
    }

    /// Applies a change under last-writer-wins.
    ///
    /// Returns true if the map changed. The prefix index is updated only
    /// when the map changed: SET indexes the key, DEL unindexes it. The
    /// publisher is notified for every change that took effect.
    ///
    /// The timestamp is reported to the clock either way, so later local
    /// writes sort after it.
    pub fn apply(&self, record: &ChangeRecord) -> bool {
        self.clock.observe(&record.timestamp);
        self.apply_and_publish(record)
    }

    fn apply_and_publish(&self, record: &ChangeRecord) -> bool {
        let changed = self.apply_to_map(record);
        if changed {
            self.publish(record);
        } else {
            tracing::trace!(revision = record.revision, ts = %record.timestamp, "stale change ignored");
        }
        changed
    }

    fn apply_to_map(&self, record: &ChangeRecord) -> bool {
        let item = KvItem::from(record);
        let live = !item.is_tombstone();
        match self.map.entry(record.key.clone()) {
            Entry::Occupied(mut entry) => {
                if record.timestamp <= entry.get().timestamp {
                    return false;
                }
                let was_live = !entry.get().is_tombstone();
                entry.insert(item);
                match (was_live, live) {
                    (false, true) => self.index.add(&record.key),
                    (true, false) => {
                        self.index.remove(&record.key);
                    }
                    _ => {}
                }
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(item);
                if live {
                    self.index.add(&record.key);
                }
                true
            }
        }
    }

    fn publish(&self, record: &ChangeRecord) {
        let publisher = &self.publisher;
        if panic::catch_unwind(AssertUnwindSafe(|| publisher.publish(record))).is_err() {
            tracing::warn!(revision = record.revision, "change publisher panicked");
        }
    }

    /// Live value of `key`, or `None` if absent or deleted.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.map.get(key).and_then(|item| item.value.clone())
    }

    /// Stored item for `key`, tombstones included.
    #[must_use]
    pub fn get_item(&self, key: &[u8]) -> Option<KvItem> {
        self.map.get(key).map(|item| item.value().clone())
    }

    /// Live items whose key starts with `prefix`, in lexicographic key order.
    ///
    /// Keys found in the index are cross-checked against the map, so a key
    /// deleted between the two lookups is skipped rather than returned.
    #[must_use]
    pub fn get_by_prefix(&self, prefix: &[u8]) -> Vec<KvItem> {
        self.index
            .keys_with_prefix(prefix)
            .into_iter()
            .filter_map(|key| {
                self.map
                    .get(&key)
                    .filter(|item| !item.is_tombstone())
                    .map(|item| item.value().clone())
            })
            .collect()
    }

    /// Revision a compare-and-swap is checked against: the live entry's
    /// revision, or 0 when the key is absent or deleted.
    #[must_use]
    pub fn current_revision(&self, key: &[u8]) -> u64 {
        self.map
            .get(key)
            .filter(|item| !item.is_tombstone())
            .map_or(0, |item| item.revision)
    }

    /// Writes `value` if the key's current revision equals
    /// `expected_revision` (0 meaning absent or deleted).
    ///
    /// Returns the new revision, or `None` with no side effects on mismatch.
    ///
    /// # Errors
    ///
    /// Returns an error if the change log append fails; the store is then
    /// unchanged.
    pub fn try_compare_and_set(
        &self,
        key: impl Into<Bytes>,
        expected_revision: u64,
        value: impl Into<Bytes>,
    ) -> CoreResult<Option<u64>> {
        let key = key.into();
        let _guard = self.write_lock.lock();
        if self.current_revision(&key) != expected_revision {
            return Ok(None);
        }
        let record = self.commit_local(ChangeRecord::set(key, value, self.clock.now()))?;
        Ok(Some(record.revision))
    }

    /// Deletes the key if its current revision equals `expected_revision`.
    ///
    /// Returns the revision of the delete, or `None` on mismatch.
    ///
    /// # Errors
    ///
    /// Returns an error if the change log append fails.
    pub fn try_compare_and_delete(
        &self,
        key: impl Into<Bytes>,
        expected_revision: u64,
    ) -> CoreResult<Option<u64>> {
        let key = key.into();
        let _guard = self.write_lock.lock();
        if self.current_revision(&key) != expected_revision {
            return Ok(None);
        }
        let record = self.commit_local(ChangeRecord::delete(key, self.clock.now()))?;
        Ok(Some(record.revision))
    }

    /// Unconditionally sets `key`, stamping the write with the local clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the change log append fails.
    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> CoreResult<ChangeRecord> {
        let _guard = self.write_lock.lock();
        self.commit_local(ChangeRecord::set(key, value, self.clock.now()))
    }

    /// Unconditionally deletes `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the change log append fails.
    pub fn delete(&self, key: impl Into<Bytes>) -> CoreResult<ChangeRecord> {
        let _guard = self.write_lock.lock();
        self.commit_local(ChangeRecord::delete(key, self.clock.now()))
    }

    /// Logs a change that arrived from a peer and applies it.
    ///
    /// The record is appended under a fresh local revision before being
    /// applied, so it survives a restart like any local write. Returns the
    /// logged record and whether it changed the map.
    ///
    /// # Errors
    ///
    /// Returns an error if the change log append fails.
    pub fn apply_replicated(&self, record: ChangeRecord) -> CoreResult<(ChangeRecord, bool)> {
        self.clock.observe(&record.timestamp);
        let record = self.changelog.append(record)?;
        let changed = self.apply_and_publish(&record);
        Ok((record, changed))
    }

    /// Appends a locally stamped change and applies it. Callers hold the
    /// write lock.
    fn commit_local(&self, record: ChangeRecord) -> CoreResult<ChangeRecord> {
        let record = self.changelog.append(record)?;
        if !self.apply_and_publish(&record) {
            tracing::debug!(
                revision = record.revision,
                "local write superseded by a concurrent replicated change"
            );
        }
        Ok(record)
    }

    /// Snapshot of every item, tombstones included.
    #[must_use]
    pub fn export_all(&self) -> Vec<KvItem> {
        self.map.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Rebuilds the prefix index from the live keys, reclaiming arena space.
    pub fn rebuild_index(&self) {
        let live: Vec<Bytes> = self
            .map
            .iter()
            .filter(|entry| !entry.is_tombstone())
            .map(|entry| entry.key().clone())
            .collect();
        self.index.rebuild(live);
    }

    /// Number of stored items, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if nothing has ever been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of keys with a live value.
    #[must_use]
    pub fn live_len(&self) -> usize {
        self.index.len()
    }

    /// The prefix index.
    #[must_use]
    pub fn index(&self) -> &RadixKeyIndex {
        &self.index
    }

    /// The change log this store writes through.
    #[must_use]
    pub fn changelog(&self) -> &Arc<ChangeLog> {
        &self.changelog
    }
}

impl std::fmt::Debug for ReplicatedKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedKvStore")
            .field("items", &self.map.len())
            .field("live", &self.index.len())
            .finish_non_exhaustive()
    }
}
