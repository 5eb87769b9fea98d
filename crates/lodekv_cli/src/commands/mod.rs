//! CLI command implementations.

pub mod checkpoint;
pub mod dump_log;
pub mod inspect;
pub mod verify;

use lodekv_storage::frame::{Frame, FrameRead, FrameReader};
use lodekv_storage::{segment, FileBackend, StorageBackend};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Result type shared by the commands.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// What a read-only walk over one segment file found.
#[derive(Debug, Serialize)]
pub struct SegmentReport {
    /// Segment id from the file name.
    pub segment_id: u64,
    /// File size in bytes.
    pub len_bytes: u64,
    /// Number of valid frames.
    pub frames: usize,
    /// First valid sequence number, 0 if none.
    pub first_seq: u64,
    /// Last valid sequence number, 0 if none.
    pub last_seq: u64,
    /// Offset and reason of an invalid tail, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torn: Option<TornReport>,
}

/// An invalid segment tail.
#[derive(Debug, Serialize)]
pub struct TornReport {
    /// Offset of the first invalid byte.
    pub offset: u64,
    /// Bytes after `offset`.
    pub bytes: u64,
    /// What failed.
    pub reason: String,
}

/// Log directory of `data_dir`, or an error if it has none.
pub fn wal_dir(data_dir: &Path) -> CliResult<PathBuf> {
    let wal = lodekv_core::dir::wal_dir(data_dir);
    if !wal.is_dir() {
        return Err(format!("No lodekv data directory found at {}", data_dir.display()).into());
    }
    Ok(wal)
}

/// Walks every frame of a segment without modifying the file, calling
/// `on_frame` for each valid one.
pub fn walk_segment(segment_id: u64, path: &Path, mut on_frame: impl FnMut(&Frame)) -> CliResult<SegmentReport> {
    let backend = FileBackend::open_existing(path)?;
    let len_bytes = backend.len()?;
    let mut reader = FrameReader::with_limit(&backend, len_bytes);

    let mut report = SegmentReport {
        segment_id,
        len_bytes,
        frames: 0,
        first_seq: 0,
        last_seq: 0,
        torn: None,
    };
    loop {
        match reader.next_frame()? {
            FrameRead::Frame(frame) => {
                if report.frames == 0 {
                    report.first_seq = frame.seq;
                }
                report.last_seq = frame.seq;
                report.frames += 1;
                on_frame(&frame);
            }
            FrameRead::End => break,
            FrameRead::Torn { offset, reason } => {
                report.torn = Some(TornReport {
                    offset,
                    bytes: len_bytes - offset,
                    reason,
                });
                break;
            }
        }
    }
    Ok(report)
}

/// Segment files in `wal_dir`, ascending by id.
pub fn segments(wal_dir: &Path) -> CliResult<Vec<(u64, PathBuf)>> {
    Ok(segment::list(wal_dir)?)
}
