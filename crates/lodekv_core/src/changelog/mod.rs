//! Revision-numbered change log on top of the segmented log.
//!
//! The change log owns revision assignment. A revision is reserved, encoded
//! into the payload, physically appended and only then committed, all under
//! one lock, so log order, sequence order and revision order always agree
//! and a failed append never burns a revision.

pub mod codec;

use crate::error::{CoreError, CoreResult};
use crate::types::ChangeRecord;
use lodekv_storage::{SegmentMeta, SegmentedLog};
use parking_lot::Mutex;

/// Durable, revision-ordered history of every change applied on this node.
pub struct ChangeLog {
    log: SegmentedLog,
    last_revision: Mutex<u64>,
}

impl ChangeLog {
    /// Wraps an open log, restoring the revision counter from its newest
    /// record.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn open(log: SegmentedLog) -> CoreResult<Self> {
        let last_revision = recover_revision(&log)?;
        tracing::debug!(last_revision, last_seq = log.last_seq(), "opened change log");
        Ok(Self {
            log,
            last_revision: Mutex::new(last_revision),
        })
    }

    /// Assigns the next revision to `record`, appends it, and returns the
    /// stamped record.
    ///
    /// Any revision already set on `record` is overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the append fails; the revision
    /// counter is left unchanged.
    pub fn append(&self, record: ChangeRecord) -> CoreResult<ChangeRecord> {
        let mut last_revision = self.last_revision.lock();
        let record = record.with_revision(*last_revision + 1);
        let payload = codec::encode(&record)?;
        let seq = self.log.append(&payload)?;
        *last_revision = record.revision;

        tracing::debug!(
            revision = record.revision,
            seq,
            op = %record.op,
            key_len = record.key.len(),
            "appended change"
        );
        Ok(record)
    }

    /// Calls `handler` for every record with `revision > from_revision`,
    /// in log order.
    ///
    /// Payloads that pass the frame checksum but fail to decode are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns a storage error or the first error from `handler`.
    pub fn scan_from_revision(
        &self,
        from_revision: u64,
        mut handler: impl FnMut(ChangeRecord) -> CoreResult<()>,
    ) -> CoreResult<()> {
        self.log.scan_from(0, usize::MAX, |seq, payload| {
            match decode_logged(seq, payload) {
                Some(record) if record.revision > from_revision => handler(record),
                _ => Ok(()),
            }
        })?;
        Ok(())
    }

    /// Collects every record with `revision > from_revision`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn read_after(&self, from_revision: u64) -> CoreResult<Vec<ChangeRecord>> {
        let mut records = Vec::new();
        self.scan_from_revision(from_revision, |record| {
            records.push(record);
            Ok(())
        })?;
        Ok(records)
    }

    /// Calls `handler` with `(seq, record)` for every record whose sequence
    /// number is above `after_seq`. Used to replay the tail of the log on
    /// top of a checkpoint.
    ///
    /// Returns the number of records delivered.
    ///
    /// # Errors
    ///
    /// Returns a storage error or the first error from `handler`.
    pub fn replay_from_seq(
        &self,
        after_seq: u64,
        mut handler: impl FnMut(u64, ChangeRecord) -> CoreResult<()>,
    ) -> CoreResult<usize> {
        let mut delivered = 0usize;
        self.log.scan_from(after_seq, usize::MAX, |seq, payload| {
            if let Some(record) = decode_logged(seq, payload) {
                handler(seq, record)?;
                delivered += 1;
            }
            Ok::<(), CoreError>(())
        })?;
        Ok(delivered)
    }

    /// Deletes log segments fully covered by `min_seq_to_keep`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn collect_segments(&self, min_seq_to_keep: u64) -> CoreResult<usize> {
        Ok(self.log.collect_segments(min_seq_to_keep)?)
    }

    /// Raises the revision counter to at least `revision`.
    ///
    /// Called after loading a checkpoint whose log prefix has been
    /// collected, so numbering continues above the checkpoint.
    pub fn observe_revision(&self, revision: u64) {
        let mut last = self.last_revision.lock();
        if revision > *last {
            *last = revision;
        }
    }

    /// Highest revision assigned so far.
    #[must_use]
    pub fn last_revision(&self) -> u64 {
        *self.last_revision.lock()
    }

    /// Highest sequence number in the underlying log.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.log.last_seq()
    }

    /// Reads `last_seq` and `last_revision` together.
    ///
    /// Holding the revision lock keeps appends out, so the pair describes
    /// the same log position.
    #[must_use]
    pub fn position(&self) -> (u64, u64) {
        let revision = self.last_revision.lock();
        (self.log.last_seq(), *revision)
    }

    /// Segment metadata of the underlying log.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentMeta> {
        self.log.segments()
    }

    /// The underlying log.
    #[must_use]
    pub fn log(&self) -> &SegmentedLog {
        &self.log
    }
}

impl std::fmt::Debug for ChangeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeLog")
            .field("log", &self.log)
            .field("last_revision", &self.last_revision())
            .finish()
    }
}

fn decode_logged(seq: u64, payload: &[u8]) -> Option<ChangeRecord> {
    match codec::decode(payload) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(seq, error = %e, "skipping undecodable change record");
            None
        }
    }
}

fn recover_revision(log: &SegmentedLog) -> CoreResult<u64> {
    let Some((seq, payload)) = log.last_record()? else {
        return Ok(0);
    };
    if let Ok(record) = codec::decode(&payload) {
        return Ok(record.revision);
    }

    tracing::warn!(seq, "newest record is undecodable, scanning for highest revision");
    let mut highest = 0u64;
    log.scan_from(0, usize::MAX, |_, payload| {
        if let Ok(record) = codec::decode(payload) {
            highest = highest.max(record.revision);
        }
        Ok::<(), CoreError>(())
    })?;
    Ok(highest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HybridTimestamp;
    use tempfile::tempdir;

    fn ts(ms: i64) -> HybridTimestamp {
        HybridTimestamp::new(ms, 0, "n1")
    }

    fn open(dir: &std::path::Path) -> ChangeLog {
        ChangeLog::open(SegmentedLog::open(dir, 0).unwrap()).unwrap()
    }

    #[test]
    fn revisions_start_at_one_and_increase() {
        let dir = tempdir().unwrap();
        let log = open(dir.path());

        let a = log.append(ChangeRecord::set("a", "1", ts(1))).unwrap();
        let b = log.append(ChangeRecord::delete("a", ts(2)).with_revision(99)).unwrap();

        assert_eq!((a.revision, b.revision), (1, 2));
        assert_eq!(log.last_revision(), 2);
        assert_eq!(log.position(), (2, 2));
    }

    #[test]
    fn read_after_filters_by_revision() {
        let dir = tempdir().unwrap();
        let log = open(dir.path());
        for i in 0..5 {
            log.append(ChangeRecord::set(format!("k{i}"), "v", ts(i))).unwrap();
        }

        let revs: Vec<u64> = log.read_after(2).unwrap().iter().map(|r| r.revision).collect();
        assert_eq!(revs, vec![3, 4, 5]);
        assert!(log.read_after(5).unwrap().is_empty());
    }

    #[test]
    fn revision_counter_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let log = open(dir.path());
            log.append(ChangeRecord::set("a", "1", ts(1))).unwrap();
            log.append(ChangeRecord::set("b", "2", ts(2))).unwrap();
        }

        let log = open(dir.path());
        assert_eq!(log.last_revision(), 2);
        assert_eq!(log.append(ChangeRecord::set("c", "3", ts(3))).unwrap().revision, 3);
    }

    #[test]
    fn undecodable_payloads_are_skipped() {
        let dir = tempdir().unwrap();
        let log = open(dir.path());
        log.append(ChangeRecord::set("a", "1", ts(1))).unwrap();
        log.log().append(b"not cbor").unwrap();
        log.append(ChangeRecord::set("b", "2", ts(2))).unwrap();

        let keys: Vec<_> = log.read_after(0).unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["a", "b"]);

        let mut seqs = Vec::new();
        let delivered = log
            .replay_from_seq(1, |seq, _| {
                seqs.push(seq);
                Ok(())
            })
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(seqs, vec![3]);
    }

    #[test]
    fn observe_revision_only_moves_forward() {
        let dir = tempdir().unwrap();
        let log = open(dir.path());
        log.observe_revision(40);
        log.observe_revision(10);
        assert_eq!(log.append(ChangeRecord::set("a", "1", ts(1))).unwrap().revision, 41);
    }
}
