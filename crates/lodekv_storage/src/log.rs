//! The segmented append-only log.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::frame::{self, FrameRead, FrameReader, FRAME_OVERHEAD, MAX_RECORD_SIZE};
use crate::fsutil;
use crate::manifest::LogManifest;
use crate::segment::{self, SegmentMeta};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Rotation threshold used when none is configured (32 MiB).
pub const DEFAULT_SEGMENT_SIZE: u64 = 32 * 1024 * 1024;

/// Options for opening a [`SegmentedLog`].
#[derive(Debug, Clone, Copy)]
pub struct LogOptions {
    /// Rotation threshold in bytes. Zero selects [`DEFAULT_SEGMENT_SIZE`].
    pub segment_size_bytes: u64,
    /// Call `sync_all` after every append instead of only flushing.
    pub sync_on_append: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            segment_size_bytes: DEFAULT_SEGMENT_SIZE,
            sync_on_append: false,
        }
    }
}

impl LogOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rotation threshold.
    #[must_use]
    pub const fn segment_size_bytes(mut self, bytes: u64) -> Self {
        self.segment_size_bytes = bytes;
        self
    }

    /// Sets whether every append is synced to disk.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }
}

/// A durable, ordered sequence of opaque records spread over segment files.
///
/// Every appended payload receives the next sequence number, starting at 1.
/// Records are framed with a CRC-64 checksum (see [`crate::frame`]); a torn
/// or corrupt tail found during open or a scan is cut off at the last valid
/// frame boundary.
///
/// # Layout
///
/// ```text
/// <dir>/
/// ├─ manifest.json
/// ├─ 00000001.log
/// ├─ 00000002.log
/// └─ ...
/// ```
///
/// # Concurrency
///
/// Appends, rotation and garbage collection are serialized by one mutex.
/// Scans copy the segment metadata under that mutex and then read without
/// it, so they never observe a half-written frame.
pub struct SegmentedLog {
    dir: PathBuf,
    options: LogOptions,
    state: Mutex<LogState>,
}

struct LogState {
    /// Segments no longer receiving appends, ascending by id.
    sealed: Vec<SegmentMeta>,
    /// The segment receiving appends.
    active_meta: SegmentMeta,
    active: FileBackend,
    last_seq: u64,
}

impl LogState {
    fn manifest(&self, segment_size_bytes: u64) -> LogManifest {
        LogManifest {
            current_segment_id: self.active_meta.segment_id,
            last_seq: self.last_seq,
            segment_size_bytes,
        }
    }

    fn all_segments(&self) -> Vec<SegmentMeta> {
        let mut all = self.sealed.clone();
        all.push(self.active_meta.clone());
        all
    }
}

impl SegmentedLog {
    /// Opens the log in `dir` with the given rotation threshold.
    ///
    /// A threshold of zero selects [`DEFAULT_SEGMENT_SIZE`].
    ///
    /// # Errors
    ///
    /// See [`SegmentedLog::open_with_options`].
    pub fn open(dir: impl AsRef<Path>, segment_size_bytes: u64) -> StorageResult<Self> {
        Self::open_with_options(dir, LogOptions::new().segment_size_bytes(segment_size_bytes))
    }

    /// Opens or creates the log in `dir`.
    ///
    /// Every segment file is scanned and truncated at its first invalid
    /// frame. The highest surviving sequence number becomes `last_seq`,
    /// unless the manifest records a higher one (for instance after the
    /// segments holding it were garbage collected), in which case numbering
    /// continues above the manifest's value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if the segment size cannot
    /// hold a single frame, or an I/O error.
    pub fn open_with_options(dir: impl AsRef<Path>, mut options: LogOptions) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if options.segment_size_bytes == 0 {
            options.segment_size_bytes = DEFAULT_SEGMENT_SIZE;
        }
        if options.segment_size_bytes < FRAME_OVERHEAD as u64 {
            return Err(StorageError::InvalidConfig(format!(
                "segment size {} is smaller than a {FRAME_OVERHEAD} byte frame",
                options.segment_size_bytes
            )));
        }

        fs::create_dir_all(&dir)?;

        let manifest = match LogManifest::load(&dir) {
            Ok(manifest) => manifest,
            Err(StorageError::Manifest(e)) => {
                tracing::warn!(error = %e, "ignoring unreadable log manifest");
                None
            }
            Err(e) => return Err(e),
        };

        let mut sealed = Vec::new();
        let mut truncated = 0usize;
        for (id, path) in segment::list(&dir)? {
            let scan = segment::recover(id, &path)?;
            truncated += usize::from(scan.truncated.is_some());
            sealed.push(scan.meta);
        }

        let active_meta = match sealed.pop() {
            Some(meta) => meta,
            None => {
                let id = manifest.map_or(1, |m| m.current_segment_id.max(1));
                SegmentMeta::empty(id, dir.join(segment::file_name(id)))
            }
        };

        let scanned_last = sealed
            .iter()
            .chain(std::iter::once(&active_meta))
            .map(|m| m.last_seq)
            .max()
            .unwrap_or(0);
        let last_seq = scanned_last.max(manifest.map_or(0, |m| m.last_seq));

        let active = FileBackend::open(&active_meta.path)?;
        let state = LogState {
            sealed,
            active_meta,
            active,
            last_seq,
        };
        state.manifest(options.segment_size_bytes).save(&dir)?;

        tracing::info!(
            dir = %dir.display(),
            segments = state.sealed.len() + 1,
            last_seq,
            truncated,
            "opened segmented log"
        );

        Ok(Self {
            dir,
            options,
            state: Mutex::new(state),
        })
    }

    /// Appends one record and returns its sequence number.
    ///
    /// The current segment is rotated first when the frame would push it
    /// past the size threshold; a record larger than the threshold still
    /// lands whole in a fresh segment. On failure nothing is advanced and
    /// any partially written bytes are cut back.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::RecordTooLarge`] for payloads over 100 MiB,
    /// or an I/O error.
    pub fn append(&self, payload: &[u8]) -> StorageResult<u64> {
        if payload.len() > MAX_RECORD_SIZE {
            return Err(StorageError::RecordTooLarge {
                len: payload.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let mut state = self.state.lock();
        let seq = state.last_seq + 1;
        let bytes = frame::encode(seq, payload)?;

        let active_len = state.active.len()?;
        if active_len > 0 && active_len + bytes.len() as u64 > self.options.segment_size_bytes {
            self.rotate(&mut state)?;
        }

        let offset = state.active.len()?;
        let end = offset + bytes.len() as u64;
        let written = self.write_frame(&mut state.active, &bytes).and_then(|()| {
            let mut manifest = state.manifest(self.options.segment_size_bytes);
            manifest.last_seq = seq;
            manifest.save_relaxed(&self.dir)
        });
        if let Err(e) = written {
            if let Err(cut) = state.active.truncate(offset) {
                tracing::warn!(error = %cut, offset, "failed to cut back partial frame");
            }
            return Err(e);
        }

        state.active_meta.note_append(seq, end);
        state.last_seq = seq;
        tracing::trace!(seq, len = payload.len(), "appended record");
        Ok(seq)
    }

    fn write_frame(&self, active: &mut FileBackend, bytes: &[u8]) -> StorageResult<()> {
        active.append(bytes)?;
        if self.options.sync_on_append {
            active.sync()
        } else {
            active.flush()
        }
    }

    fn rotate(&self, state: &mut LogState) -> StorageResult<()> {
        let next_id = state.active_meta.segment_id + 1;
        let path = self.dir.join(segment::file_name(next_id));
        let next = FileBackend::open(&path)?;

        state.active.sync()?;
        let previous = std::mem::replace(&mut state.active_meta, SegmentMeta::empty(next_id, path));
        state.active = next;
        state.sealed.push(previous);

        state.manifest(self.options.segment_size_bytes).save(&self.dir)?;
        tracing::debug!(segment = next_id, "rotated to new segment");
        Ok(())
    }

    /// Delivers records with `seq > after_seq`, oldest first, until
    /// `max_count` records have been handed to `handler`.
    ///
    /// Works on a point-in-time copy of the segment list; records appended
    /// during the scan are not delivered. A segment deleted concurrently by
    /// [`collect_segments`](Self::collect_segments) is skipped. An invalid
    /// frame truncates that segment and moves on to the next one.
    ///
    /// Returns the number of records delivered.
    ///
    /// # Errors
    ///
    /// Returns an I/O error, or the first error produced by `handler`.
    pub fn scan_from<E>(
        &self,
        after_seq: u64,
        max_count: usize,
        mut handler: impl FnMut(u64, &[u8]) -> Result<(), E>,
    ) -> Result<usize, E>
    where
        E: From<StorageError>,
    {
        let segments = self.state.lock().all_segments();
        let mut delivered = 0usize;

        for meta in segments.iter().filter(|m| m.last_seq > after_seq) {
            if delivered >= max_count {
                break;
            }

            let backend = match FileBackend::open_existing(&meta.path) {
                Ok(backend) => backend,
                Err(StorageError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(segment = meta.segment_id, "segment collected during scan");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let mut reader = FrameReader::with_limit(&backend, meta.len_bytes);
            let mut last_valid = 0u64;
            while delivered < max_count {
                match reader.next_frame()? {
                    FrameRead::Frame(f) => {
                        last_valid = f.seq;
                        if f.seq > after_seq {
                            handler(f.seq, &f.payload)?;
                            delivered += 1;
                        }
                    }
                    FrameRead::End => break,
                    FrameRead::Torn { offset, reason } => {
                        self.repair(meta.segment_id, offset, last_valid, &reason)?;
                        break;
                    }
                }
            }
        }

        Ok(delivered)
    }

    /// Collects every record with `seq > after_seq`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    pub fn read_after(&self, after_seq: u64) -> StorageResult<Vec<(u64, Vec<u8>)>> {
        let mut out = Vec::new();
        self.scan_from(after_seq, usize::MAX, |seq, payload| {
            out.push((seq, payload.to_vec()));
            Ok::<(), StorageError>(())
        })?;
        Ok(out)
    }

    /// Returns the newest record, if any segment still holds one.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    pub fn last_record(&self) -> StorageResult<Option<(u64, Vec<u8>)>> {
        let newest = {
            let state = self.state.lock();
            state
                .all_segments()
                .into_iter()
                .rev()
                .find(|m| !m.is_empty())
        };
        let Some(meta) = newest else {
            return Ok(None);
        };

        let mut last = None;
        self.scan_from(meta.last_seq - 1, 1, |seq, payload| {
            last = Some((seq, payload.to_vec()));
            Ok::<(), StorageError>(())
        })?;
        Ok(last)
    }

    /// Deletes sealed segments whose records all have `seq <= min_seq_to_keep`.
    ///
    /// The active segment and empty segments are never removed. Returns the
    /// number of segment files deleted.
    ///
    /// # Errors
    ///
    /// Returns an I/O error; segments removed before the failure stay removed.
    pub fn collect_segments(&self, min_seq_to_keep: u64) -> StorageResult<usize> {
        let mut state = self.state.lock();
        let mut removed = 0usize;
        let mut result = Ok(());

        state.sealed.retain(|meta| {
            if result.is_err() || meta.is_empty() || meta.last_seq > min_seq_to_keep {
                return true;
            }
            match fs::remove_file(&meta.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    result = Err(e);
                    return true;
                }
            }
            removed += 1;
            false
        });

        if removed > 0 {
            fsutil::sync_dir(&self.dir)?;
            tracing::info!(removed, min_seq_to_keep, "collected log segments");
        }
        result.map_err(StorageError::from)?;
        Ok(removed)
    }

    fn repair(&self, segment_id: u64, offset: u64, last_valid: u64, reason: &str) -> StorageResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let discarded;
        let meta = if state.active_meta.segment_id == segment_id {
            discarded = state.active.len()?.saturating_sub(offset);
            state.active.truncate(offset)?;
            &mut state.active_meta
        } else {
            let Some(meta) = state.sealed.iter_mut().find(|m| m.segment_id == segment_id) else {
                return Ok(());
            };
            let mut backend = FileBackend::open_existing(&meta.path)?;
            discarded = backend.len()?.saturating_sub(offset);
            backend.truncate(offset)?;
            meta
        };

        meta.len_bytes = offset;
        meta.last_seq = last_valid;
        if last_valid == 0 {
            meta.first_seq = 0;
        }

        tracing::warn!(segment = segment_id, offset, discarded, reason, "truncated corrupt segment tail");
        Ok(())
    }

    /// Highest sequence number handed out.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.state.lock().last_seq
    }

    /// Number of segment files, including the active one.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.state.lock().sealed.len() + 1
    }

    /// Copy of the metadata of every segment, oldest first.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentMeta> {
        self.state.lock().all_segments()
    }

    /// Directory holding the segments and manifest.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Effective rotation threshold.
    #[must_use]
    pub fn segment_size_bytes(&self) -> u64 {
        self.options.segment_size_bytes
    }
}

impl std::fmt::Debug for SegmentedLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentedLog")
            .field("dir", &self.dir)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn collect(log: &SegmentedLog, after: u64, max: usize) -> Vec<(u64, Vec<u8>)> {
        let mut out = Vec::new();
        log.scan_from(after, max, |seq, p| {
            out.push((seq, p.to_vec()));
            Ok::<(), StorageError>(())
        })
        .unwrap();
        out
    }

    #[test]
    fn sequence_numbers_start_at_one() {
        let dir = tempdir().unwrap();
        let log = SegmentedLog::open(dir.path(), 0).unwrap();

        assert_eq!(log.segment_size_bytes(), DEFAULT_SEGMENT_SIZE);
        assert_eq!(log.append(b"a").unwrap(), 1);
        assert_eq!(log.append(b"b").unwrap(), 2);
        assert_eq!(log.last_seq(), 2);
    }

    #[test]
    fn tiny_segment_size_is_rejected() {
        let dir = tempdir().unwrap();
        let err = SegmentedLog::open(dir.path(), 8).unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(_)));
    }

    #[test]
    fn scan_respects_after_seq_and_max_count() {
        let dir = tempdir().unwrap();
        let log = SegmentedLog::open(dir.path(), 0).unwrap();
        for i in 0..5u8 {
            log.append(&[i]).unwrap();
        }

        let got = collect(&log, 2, 2);
        assert_eq!(got, vec![(3, vec![2]), (4, vec![3])]);
        assert!(collect(&log, 5, usize::MAX).is_empty());
    }

    #[test]
    fn rotation_happens_before_overflowing_write() {
        let dir = tempdir().unwrap();
        // Room for exactly two 10-byte payload frames.
        let log = SegmentedLog::open(dir.path(), 60).unwrap();
        for _ in 0..5 {
            log.append(&[7u8; 10]).unwrap();
        }

        let segments = log.segments();
        assert_eq!(segments.len(), 3);
        assert_eq!((segments[0].first_seq, segments[0].last_seq), (1, 2));
        assert_eq!((segments[1].first_seq, segments[1].last_seq), (3, 4));
        assert_eq!((segments[2].first_seq, segments[2].last_seq), (5, 5));
        for meta in &segments {
            assert!(fs::metadata(&meta.path).unwrap().len() <= 60);
        }
    }

    #[test]
    fn oversized_record_gets_its_own_segment() {
        let dir = tempdir().unwrap();
        let log = SegmentedLog::open(dir.path(), 40).unwrap();

        log.append(b"small").unwrap();
        log.append(&[1u8; 100]).unwrap();

        let segments = log.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].first_seq, 2);
        assert_eq!(collect(&log, 0, usize::MAX).len(), 2);
    }

    #[test]
    fn collect_segments_keeps_active_and_newer() {
        let dir = tempdir().unwrap();
        let log = SegmentedLog::open(dir.path(), 60).unwrap();
        for _ in 0..6 {
            log.append(&[0u8; 10]).unwrap();
        }
        assert_eq!(log.segment_count(), 3);

        assert_eq!(log.collect_segments(3).unwrap(), 1);
        let remaining: Vec<u64> = log.segments().iter().map(|m| m.first_seq).collect();
        assert_eq!(remaining, vec![3, 5]);

        // Everything is below the watermark, but the active segment stays.
        assert_eq!(log.collect_segments(u64::MAX).unwrap(), 1);
        assert_eq!(log.segment_count(), 1);
        assert_eq!(collect(&log, 0, usize::MAX).len(), 2);
    }

    #[test]
    fn reopen_restores_last_seq_and_records() {
        let dir = tempdir().unwrap();
        {
            let log = SegmentedLog::open(dir.path(), 60).unwrap();
            for i in 0..5u8 {
                log.append(&[i; 10]).unwrap();
            }
        }

        let log = SegmentedLog::open(dir.path(), 60).unwrap();
        assert_eq!(log.last_seq(), 5);
        assert_eq!(log.segment_count(), 3);
        assert_eq!(log.append(b"next").unwrap(), 6);
        assert_eq!(collect(&log, 0, usize::MAX).len(), 6);
    }

    #[test]
    fn numbering_continues_from_manifest_when_segments_are_gone() {
        let dir = tempdir().unwrap();
        {
            let log = SegmentedLog::open(dir.path(), 30).unwrap();
            log.append(&[1u8; 10]).unwrap();
            log.append(&[2u8; 10]).unwrap();
        }
        for (_, path) in segment::list(dir.path()).unwrap() {
            fs::remove_file(path).unwrap();
        }

        let log = SegmentedLog::open(dir.path(), 30).unwrap();
        assert_eq!(log.last_seq(), 2);
        assert_eq!(log.append(b"x").unwrap(), 3);
    }

    #[test]
    fn last_record_reads_newest() {
        let dir = tempdir().unwrap();
        let log = SegmentedLog::open(dir.path(), 0).unwrap();
        assert!(log.last_record().unwrap().is_none());

        log.append(b"first").unwrap();
        log.append(b"second").unwrap();
        assert_eq!(log.last_record().unwrap(), Some((2, b"second".to_vec())));
    }

    #[test]
    fn record_limit_is_enforced() {
        let dir = tempdir().unwrap();
        let log = SegmentedLog::open(dir.path(), 0).unwrap();
        let payload = vec![0u8; MAX_RECORD_SIZE + 1];

        assert!(matches!(
            log.append(&payload),
            Err(StorageError::RecordTooLarge { .. })
        ));
        assert_eq!(log.last_seq(), 0);
    }

    #[test]
    fn handler_error_stops_scan() {
        let dir = tempdir().unwrap();
        let log = SegmentedLog::open(dir.path(), 0).unwrap();
        log.append(b"a").unwrap();
        log.append(b"b").unwrap();

        let mut seen = 0;
        let result = log.scan_from(0, usize::MAX, |_, _| {
            seen += 1;
            Err(StorageError::Corrupted("stop".into()))
        });
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }
}
