//! Crash-recovery behaviour of the segmented log.

use lodekv_storage::{frame, segment, LogManifest, SegmentedLog, StorageError};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use tempfile::tempdir;

fn payloads(log: &SegmentedLog) -> Vec<(u64, Vec<u8>)> {
    log.read_after(0).unwrap()
}

#[test]
fn torn_tail_is_dropped_and_appends_continue() {
    let dir = tempdir().unwrap();
    {
        let log = SegmentedLog::open(dir.path(), 0).unwrap();
        log.append(b"one").unwrap();
        log.append(b"two").unwrap();
    }

    // Simulate a crash halfway through the third frame.
    let (_, path) = segment::list(dir.path()).unwrap().pop().unwrap();
    let partial = frame::encode(3, b"three").unwrap();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&partial[..partial.len() / 2]).unwrap();
    drop(file);

    let log = SegmentedLog::open(dir.path(), 0).unwrap();
    assert_eq!(
        payloads(&log),
        vec![(1, b"one".to_vec()), (2, b"two".to_vec())]
    );

    let seq = log.append(b"three").unwrap();
    assert!(seq >= 3);
    assert_eq!(payloads(&log).last().unwrap().1, b"three");
}

#[test]
fn bit_flip_in_middle_truncates_from_that_record() {
    let dir = tempdir().unwrap();
    let first_len = frame::encode(1, b"alpha").unwrap().len() as u64;
    {
        let log = SegmentedLog::open(dir.path(), 0).unwrap();
        log.append(b"alpha").unwrap();
        log.append(b"bravo").unwrap();
        log.append(b"charlie").unwrap();
    }

    let (_, path) = segment::list(dir.path()).unwrap().pop().unwrap();
    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(first_len + frame::HEADER_LEN as u64)).unwrap();
    file.write_all(b"X").unwrap();
    drop(file);

    let log = SegmentedLog::open(dir.path(), 0).unwrap();
    assert_eq!(payloads(&log), vec![(1, b"alpha".to_vec())]);
    assert_eq!(fs::metadata(&path).unwrap().len(), first_len);
}

#[test]
fn corruption_found_by_scan_is_truncated() {
    let dir = tempdir().unwrap();
    let log = SegmentedLog::open(dir.path(), 0).unwrap();
    log.append(b"keep").unwrap();
    log.append(b"lose").unwrap();

    let first_len = frame::encode(1, b"keep").unwrap().len() as u64;
    let path = log.segments()[0].path.clone();
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(first_len + frame::HEADER_LEN as u64)).unwrap();
    file.write_all(b"?").unwrap();
    drop(file);

    assert_eq!(payloads(&log), vec![(1, b"keep".to_vec())]);
    assert_eq!(fs::metadata(&path).unwrap().len(), first_len);
    assert_eq!(log.segments()[0].last_seq, 1);

    // Sequence numbers never move backwards.
    assert_eq!(log.append(b"after").unwrap(), 3);
}

#[test]
fn corruption_in_sealed_segment_is_truncated_and_later_segments_still_scan() {
    let dir = tempdir().unwrap();
    let log = SegmentedLog::open(dir.path(), 60).unwrap();
    for i in 0..5u8 {
        log.append(&[i; 10]).unwrap();
    }
    assert_eq!(log.segment_count(), 3);

    let frame_len = frame::encode(1, &[0u8; 10]).unwrap().len() as u64;
    let sealed = log.segments()[0].path.clone();
    let mut file = OpenOptions::new().write(true).open(&sealed).unwrap();
    file.seek(SeekFrom::Start(frame_len + frame::HEADER_LEN as u64)).unwrap();
    file.write_all(b"!").unwrap();
    drop(file);

    let seqs: Vec<u64> = payloads(&log).into_iter().map(|(s, _)| s).collect();
    assert_eq!(seqs, vec![1, 3, 4, 5]);
    assert_eq!(fs::metadata(&sealed).unwrap().len(), frame_len);
    assert_eq!(log.segments()[0].last_seq, 1);
    assert_eq!(log.last_seq(), 5);
}

#[test]
fn manifest_tracks_appends_and_rotation() {
    let dir = tempdir().unwrap();
    let log = SegmentedLog::open(dir.path(), 60).unwrap();
    for _ in 0..3 {
        log.append(&[0u8; 10]).unwrap();
    }

    let manifest = LogManifest::load(dir.path()).unwrap().unwrap();
    assert_eq!(manifest.last_seq, 3);
    assert_eq!(manifest.current_segment_id, 2);
    assert_eq!(manifest.segment_size_bytes, 60);
}

#[test]
fn unreadable_manifest_is_rebuilt_from_segments() {
    let dir = tempdir().unwrap();
    {
        let log = SegmentedLog::open(dir.path(), 0).unwrap();
        log.append(b"a").unwrap();
    }
    fs::write(LogManifest::path(dir.path()), b"\0\0garbage").unwrap();

    let log = SegmentedLog::open(dir.path(), 0).unwrap();
    assert_eq!(log.last_seq(), 1);
    assert_eq!(LogManifest::load(dir.path()).unwrap().unwrap().last_seq, 1);
}

#[test]
fn concurrent_appends_get_unique_gapless_sequences() {
    let dir = tempdir().unwrap();
    let log = std::sync::Arc::new(SegmentedLog::open(dir.path(), 512).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let log = log.clone();
            std::thread::spawn(move || {
                (0..50)
                    .map(|i| log.append(format!("{t}-{i}").as_bytes()).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seqs: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=200).collect::<Vec<_>>());

    let scanned: Vec<u64> = payloads(&log).into_iter().map(|(s, _)| s).collect();
    assert_eq!(scanned, seqs);
    assert!(log.segment_count() > 1);

    let err = log.scan_from(0, usize::MAX, |_, _| Err(StorageError::Corrupted("halt".into())));
    assert!(err.is_err());
}
