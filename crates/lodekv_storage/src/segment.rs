//! Segment file naming, discovery and recovery.

use crate::backend::StorageBackend;
use crate::error::StorageResult;
use crate::file::FileBackend;
use crate::frame::{FrameRead, FrameReader};
use std::fs;
use std::path::{Path, PathBuf};

/// Extension shared by every segment file.
pub const SEGMENT_EXTENSION: &str = "log";

/// What the log knows about one segment file.
///
/// A segment whose `last_seq` is 0 holds no records yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMeta {
    /// Monotonic segment identifier, also encoded in the file name.
    pub segment_id: u64,
    /// Full path of the file.
    pub path: PathBuf,
    /// Sequence number of the first record, or 0 if empty.
    pub first_seq: u64,
    /// Sequence number of the last record, or 0 if empty.
    pub last_seq: u64,
    /// Length of the valid frame data in bytes.
    pub len_bytes: u64,
}

impl SegmentMeta {
    /// Metadata for a segment that has no records.
    #[must_use]
    pub fn empty(segment_id: u64, path: PathBuf) -> Self {
        Self {
            segment_id,
            path,
            first_seq: 0,
            last_seq: 0,
            len_bytes: 0,
        }
    }

    /// Returns true if the segment holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_seq == 0
    }

    /// Records a frame that was just appended.
    pub(crate) fn note_append(&mut self, seq: u64, end: u64) {
        if self.first_seq == 0 {
            self.first_seq = seq;
        }
        self.last_seq = seq;
        self.len_bytes = end;
    }
}

/// File name for a segment id, e.g. `00000012.log`.
#[must_use]
pub fn file_name(segment_id: u64) -> String {
    format!("{segment_id:08}.{SEGMENT_EXTENSION}")
}

/// Parses a segment id back out of a file name.
#[must_use]
pub fn parse_file_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Lists the segment files in `dir`, ordered by id.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list(dir: &Path) -> StorageResult<Vec<(u64, PathBuf)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(id) = entry.file_name().to_str().and_then(parse_file_name) {
            found.push((id, entry.path()));
        }
    }
    found.sort_by_key(|(id, _)| *id);
    Ok(found)
}

/// Outcome of walking one segment from the start.
#[derive(Debug)]
pub struct SegmentScan {
    /// Metadata describing the valid prefix.
    pub meta: SegmentMeta,
    /// Set when a torn tail was found and cut off.
    pub truncated: Option<TornTail>,
}

/// Description of a tail removed during recovery.
#[derive(Debug, Clone)]
pub struct TornTail {
    /// Offset the file was truncated to.
    pub offset: u64,
    /// Bytes discarded.
    pub discarded: u64,
    /// Why the frame at `offset` was rejected.
    pub reason: String,
}

/// Walks a segment file, truncating it at the first invalid frame.
///
/// # Errors
///
/// Returns an error on I/O failure.
pub fn recover(segment_id: u64, path: &Path) -> StorageResult<SegmentScan> {
    let mut backend = FileBackend::open(path)?;
    let file_len = backend.len()?;
    let mut meta = SegmentMeta::empty(segment_id, path.to_path_buf());

    let torn = {
        let mut reader = FrameReader::with_limit(&backend, file_len);
        loop {
            match reader.next_frame()? {
                FrameRead::Frame(frame) => meta.note_append(frame.seq, frame.end()),
                FrameRead::End => break None,
                FrameRead::Torn { offset, reason } => break Some((offset, reason)),
            }
        }
    };

    let truncated = match torn {
        Some((offset, reason)) => {
            backend.truncate(offset)?;
            tracing::warn!(
                segment = segment_id,
                offset,
                discarded = file_len - offset,
                %reason,
                "truncated torn segment tail"
            );
            Some(TornTail {
                offset,
                discarded: file_len - offset,
                reason,
            })
        }
        None => None,
    };

    Ok(SegmentScan { meta, truncated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn names_round_trip() {
        assert_eq!(file_name(1), "00000001.log");
        assert_eq!(file_name(123_456_789), "123456789.log");
        assert_eq!(parse_file_name("00000042.log"), Some(42));
        assert_eq!(parse_file_name("manifest.json"), None);
        assert_eq!(parse_file_name("snapshot.log.tmp"), None);
        assert_eq!(parse_file_name(".log"), None);
    }

    #[test]
    fn list_ignores_other_files_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["00000003.log", "00000001.log", "manifest.json", "x.log"] {
            fs::File::create(dir.path().join(name)).unwrap();
        }
        let ids: Vec<u64> = list(dir.path()).unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn recover_truncates_garbage_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(file_name(1));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&frame::encode(5, b"a").unwrap()).unwrap();
        file.write_all(&frame::encode(6, b"bb").unwrap()).unwrap();
        file.write_all(&[0xde, 0xad, 0xbe]).unwrap();
        drop(file);

        let scan = recover(1, &path).unwrap();
        assert_eq!(scan.meta.first_seq, 5);
        assert_eq!(scan.meta.last_seq, 6);
        let tail = scan.truncated.unwrap();
        assert_eq!(tail.discarded, 3);
        assert_eq!(fs::metadata(&path).unwrap().len(), tail.offset);
        assert_eq!(scan.meta.len_bytes, tail.offset);
    }

    #[test]
    fn recover_empty_segment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(file_name(9));
        fs::File::create(&path).unwrap();

        let scan = recover(9, &path).unwrap();
        assert!(scan.meta.is_empty());
        assert!(scan.truncated.is_none());
    }
}
