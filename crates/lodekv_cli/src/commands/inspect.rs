//! Inspect command implementation.

use super::{segments, walk_segment, wal_dir, CliResult, SegmentReport};
use lodekv_core::snapshot::{read_meta, SnapshotMeta};
use lodekv_storage::LogManifest;
use serde::Serialize;
use std::path::Path;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// Log manifest, if present.
    pub manifest: Option<LogManifest>,
    /// Checkpoint metadata, if present.
    pub snapshot: Option<SnapshotMeta>,
    /// Number of segment files.
    pub segment_count: usize,
    /// Total bytes across segments.
    pub log_bytes: u64,
    /// Valid frames across segments.
    pub record_count: usize,
    /// Lowest sequence number still on disk.
    pub first_seq: u64,
    /// Highest sequence number on disk.
    pub last_seq: u64,
    /// Per-segment details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentReport>>,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_segments: bool, format: &str) -> CliResult<()> {
    let wal = wal_dir(path)?;

    let mut reports = Vec::new();
    for (id, segment_path) in segments(&wal)? {
        reports.push(walk_segment(id, &segment_path, |_| {})?);
    }

    let result = InspectResult {
        path: path.display().to_string(),
        manifest: LogManifest::load(&wal)?,
        snapshot: read_meta(&wal)?,
        segment_count: reports.len(),
        log_bytes: reports.iter().map(|r| r.len_bytes).sum(),
        record_count: reports.iter().map(|r| r.frames).sum(),
        first_seq: reports.iter().find(|r| r.frames > 0).map_or(0, |r| r.first_seq),
        last_seq: reports.iter().map(|r| r.last_seq).max().unwrap_or(0),
        segments: show_segments.then_some(reports),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("lodekv data directory: {}", result.path);
    println!();

    println!("Log:");
    println!("  Segments:  {}", result.segment_count);
    println!("  Size:      {} bytes", result.log_bytes);
    println!("  Records:   {}", result.record_count);
    println!("  Seq range: {}..={}", result.first_seq, result.last_seq);

    match &result.manifest {
        Some(m) => {
            println!();
            println!("Manifest:");
            println!("  Current segment: {}", m.current_segment_id);
            println!("  Last seq:        {}", m.last_seq);
            println!("  Segment size:    {} bytes", m.segment_size_bytes);
        }
        None => println!("  (no manifest)"),
    }

    println!();
    match &result.snapshot {
        Some(s) => {
            println!("Checkpoint:");
            println!("  Last revision: {}", s.last_revision);
            println!("  Log offset:    {}", s.last_wal_offset);
            println!("  Created by:    {}", s.created_by_node);
        }
        None => println!("Checkpoint: none"),
    }

    if let Some(segments) = &result.segments {
        println!();
        println!("Segments:");
        for s in segments {
            print!(
                "  #{:<8} {:>10} bytes  {:>6} frames  seq {}..={}",
                s.segment_id, s.len_bytes, s.frames, s.first_seq, s.last_seq
            );
            match &s.torn {
                Some(t) => println!("  TORN at {} ({})", t.offset, t.reason),
                None => println!(),
            }
        }
    }
}
