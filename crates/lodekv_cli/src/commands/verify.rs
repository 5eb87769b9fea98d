//! Verify command implementation.

use super::{segments, walk_segment, wal_dir, CliResult};
use lodekv_core::changelog::codec;
use lodekv_core::snapshot::{self, SNAPSHOT_FILE};
use lodekv_storage::LogManifest;
use std::fs;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Frames read.
    pub records_checked: usize,
    /// Frames that decode as change records.
    pub valid_records: usize,
    /// Frames whose payload does not decode.
    pub undecodable_records: usize,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.undecodable_records == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying data directory at {}", path.display());
    println!();

    let result = verify(path)?;
    println!(
        "  Records checked: {}, valid: {}, undecodable: {}",
        result.records_checked, result.valid_records, result.undecodable_records
    );
    for error in &result.errors {
        println!("    ERROR: {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Verification passed");
        Ok(())
    } else {
        println!("✗ Verification failed");
        Err("Verification failed".into())
    }
}

/// Checks every segment frame, sequence ordering, the manifest and the
/// checkpoint files without modifying anything.
pub fn verify(path: &Path) -> CliResult<VerifyResult> {
    let wal = wal_dir(path)?;
    let mut result = VerifyResult::default();
    let mut prev_seq = 0u64;

    for (id, segment_path) in segments(&wal)? {
        let mut out_of_order = Vec::new();
        let report = walk_segment(id, &segment_path, |frame| {
            result.records_checked += 1;
            if frame.seq <= prev_seq {
                out_of_order.push((frame.seq, prev_seq));
            }
            prev_seq = frame.seq;
            match codec::decode(&frame.payload) {
                Ok(_) => result.valid_records += 1,
                Err(e) => {
                    result.undecodable_records += 1;
                    result
                        .errors
                        .push(format!("segment {id}: seq {} does not decode: {e}", frame.seq));
                }
            }
        })?;

        for (seq, prev) in out_of_order {
            result
                .errors
                .push(format!("segment {id}: seq {seq} does not follow {prev}"));
        }
        if let Some(torn) = report.torn {
            result.errors.push(format!(
                "segment {id}: invalid tail at offset {} ({} bytes): {}",
                torn.offset, torn.bytes, torn.reason
            ));
        }
    }

    match LogManifest::load(&wal) {
        Ok(Some(manifest)) if manifest.last_seq < prev_seq => result.errors.push(format!(
            "manifest last_seq {} is behind the log ({prev_seq})",
            manifest.last_seq
        )),
        Ok(_) => {}
        Err(e) => result.errors.push(format!("manifest unreadable: {e}")),
    }

    match snapshot::read_meta(&wal) {
        Ok(Some(meta)) => match fs::read(wal.join(SNAPSHOT_FILE)) {
            Ok(bytes) => match snapshot::format::decode(&bytes) {
                Ok(blob) if blob.last_log_offset != meta.last_wal_offset => result.errors.push(format!(
                    "checkpoint blob offset {} disagrees with metadata {}",
                    blob.last_log_offset, meta.last_wal_offset
                )),
                Ok(_) => {}
                Err(e) => result.errors.push(format!("checkpoint blob unreadable: {e}")),
            },
            Err(e) => result.errors.push(format!("checkpoint blob missing: {e}")),
        },
        Ok(None) => {}
        Err(e) => result.errors.push(format!("checkpoint metadata unreadable: {e}")),
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodekv_core::{Config, Engine};
    use std::io::Write;
    use tempfile::tempdir;

    fn populate(path: &Path) {
        let engine = Engine::open(Config::new(path).node_id("t").segment_size_bytes(256)).unwrap();
        for i in 0..20 {
            engine.put(format!("k{i}"), "value").unwrap();
        }
        engine.snapshot().unwrap();
        engine.delete("k0").unwrap();
    }

    #[test]
    fn healthy_directory_passes() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let result = verify(dir.path()).unwrap();
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.records_checked, result.valid_records);
        assert!(result.records_checked >= 1);
    }

    #[test]
    fn torn_tail_is_reported() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let wal = wal_dir(dir.path()).unwrap();
        let (_, last) = segments(&wal).unwrap().pop().unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(last)
            .unwrap()
            .write_all(&[1, 2, 3])
            .unwrap();

        let result = verify(dir.path()).unwrap();
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("invalid tail")));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(verify(&dir.path().join("absent")).is_err());
    }
}
