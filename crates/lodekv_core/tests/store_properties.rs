//! End-to-end behaviour of the change log, store and checkpoints.

use lodekv_core::{
    ChangeLog, ChangeRecord, Config, Engine, HybridClock, HybridTimestamp, NoopPublisher,
    ReplicatedKvStore, SnapshotManager, SnapshotSchedulerOptions,
};
use lodekv_storage::SegmentedLog;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn open_store(dir: &Path) -> Arc<ReplicatedKvStore> {
    let log = ChangeLog::open(SegmentedLog::open(dir, 0).unwrap()).unwrap();
    Arc::new(ReplicatedKvStore::new(
        Arc::new(log),
        Arc::new(HybridClock::new("local")),
        Arc::new(NoopPublisher),
    ))
}

fn ts(ms: i64, node: &str) -> HybridTimestamp {
    HybridTimestamp::new(ms, 0, node)
}

#[test]
fn concurrent_appends_get_dense_revisions_in_log_order() {
    let dir = tempdir().unwrap();
    let log = Arc::new(ChangeLog::open(SegmentedLog::open(dir.path(), 512).unwrap()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let log = log.clone();
            thread::spawn(move || {
                (0..50)
                    .map(|i| {
                        log.append(ChangeRecord::set(format!("t{t}/{i}"), "v", ts(i, "n")))
                            .unwrap()
                            .revision
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut revisions: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    revisions.sort_unstable();
    assert_eq!(revisions, (1..=200).collect::<Vec<_>>());

    // On-disk order is revision order.
    let mut seqs = Vec::new();
    log.replay_from_seq(0, |seq, record| {
        assert_eq!(seq, record.revision);
        seqs.push(seq);
        Ok(())
    })
    .unwrap();
    assert_eq!(seqs.len(), 200);
    assert!(log.segments().len() > 1);
}

#[test]
fn lww_converges_regardless_of_arrival_order() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    let older = ChangeRecord::set("k", "v1", ts(100, "a"));
    let newer = ChangeRecord::set("k", "v2", ts(200, "b"));

    let in_order = open_store(first.path());
    in_order.apply(&older);
    in_order.apply(&newer);

    let reversed = open_store(second.path());
    reversed.apply(&newer);
    reversed.apply(&older);

    assert_eq!(in_order.get(b"k").unwrap(), "v2");
    assert_eq!(reversed.get(b"k").unwrap(), "v2");
    assert_eq!(in_order.get_item(b"k"), reversed.get_item(b"k"));
}

#[test]
fn index_only_holds_live_keys() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    store.apply(&ChangeRecord::set("a/1", "x", ts(10, "n")));
    store.apply(&ChangeRecord::set("a/2", "x", ts(10, "n")));
    store.apply(&ChangeRecord::delete("a/1", ts(20, "n")));
    // Stale delete must not unindex a newer value.
    store.apply(&ChangeRecord::delete("a/2", ts(5, "n")));
    // Stale set must not reindex a newer tombstone.
    store.apply(&ChangeRecord::set("a/1", "old", ts(15, "n")));

    for item in store.export_all() {
        assert_eq!(store.index().contains(&item.key), !item.is_tombstone(), "{:?}", item.key);
    }
    let live: Vec<_> = store.get_by_prefix(b"a/").into_iter().map(|i| i.key).collect();
    assert_eq!(live, vec!["a/2"]);
}

#[test]
fn compare_and_set_semantics() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let rev = store.try_compare_and_set("k", 0, "v").unwrap().unwrap();
    assert_eq!(store.try_compare_and_set("k", 0, "v").unwrap(), None);
    assert_eq!(store.try_compare_and_set("k", rev + 1, "v2").unwrap(), None);
    assert_eq!(store.get(b"k").unwrap(), "v");

    let rev2 = store.try_compare_and_set("k", rev, "v2").unwrap().unwrap();
    assert_eq!(store.current_revision(b"k"), rev2);
    assert_eq!(store.get(b"k").unwrap(), "v2");
}

#[test]
fn concurrent_cas_on_absent_key_has_one_winner() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || store.try_compare_and_set("leader", 0, format!("n{i}")).unwrap())
        })
        .collect();
    let winners = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn snapshot_round_trip_into_fresh_store() {
    let src = tempdir().unwrap();
    let store = open_store(src.path());
    let alpha = ts(1_000, "a");
    let beta = ts(2_000, "b");
    store.apply(&ChangeRecord::set("alpha", "111", alpha.clone()));
    store.apply(&ChangeRecord::set("beta", "222", beta.clone()));
    SnapshotManager::new(store, src.path(), "local").create_snapshot().unwrap();

    let dst = tempdir().unwrap();
    let fresh = open_store(dst.path());
    assert!(SnapshotManager::new(fresh.clone(), src.path(), "other").try_load().unwrap());

    let a = fresh.get_item(b"alpha").unwrap();
    let b = fresh.get_item(b"beta").unwrap();
    assert_eq!(a.value.unwrap(), "111");
    assert_eq!(a.timestamp, alpha);
    assert_eq!(b.value.unwrap(), "222");
    assert_eq!(b.timestamp, beta);
    assert_eq!(fresh.live_len(), 2);
}

#[test]
fn restored_items_restart_cas_at_zero() {
    let dir = tempdir().unwrap();
    {
        let engine = Engine::open(Config::new(dir.path()).node_id("n1")).unwrap();
        engine.compare_and_set("k", 0, "v").unwrap().unwrap();
        engine.snapshot().unwrap();
    }

    let engine = Engine::open(Config::new(dir.path()).node_id("n1")).unwrap();
    assert_eq!(engine.store().current_revision(b"k"), 0);
    let rev = engine.compare_and_set("k", 0, "w").unwrap().unwrap();
    assert_eq!(rev, 2);
    assert_eq!(engine.get(b"k").unwrap(), "w");
}

#[test]
fn recovery_after_segment_gc() {
    let dir = tempdir().unwrap();
    let config = Config::new(dir.path())
        .node_id("n1")
        .segment_size_bytes(128)
        .snapshot(SnapshotSchedulerOptions::default().min_seq_delta(10));

    {
        let engine = Engine::open(config.clone()).unwrap();
        for i in 0..25 {
            engine.put(format!("key/{i:02}"), format!("v{i}")).unwrap();
        }
        let before = engine.stats().segments;
        let meta = engine.run_scheduler_once().unwrap().unwrap();
        assert_eq!(meta.last_wal_offset, 25);
        assert!(engine.stats().segments < before);

        for i in 0..5 {
            engine.delete(format!("key/{i:02}")).unwrap();
        }
        assert!(engine.run_scheduler_once().unwrap().is_none());
    }

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.recovery().replayed, 5);
    assert_eq!(engine.get_by_prefix(b"key/").len(), 20);
    assert!(engine.get(b"key/00").is_none());
    assert_eq!(engine.get(b"key/24").unwrap(), "v24");
    assert_eq!(engine.stats().last_revision, 30);
    assert_eq!(engine.put("next", "x").unwrap().revision, 31);
}

#[test]
fn records_above_gc_point_survive_collection() {
    let dir = tempdir().unwrap();
    let log = ChangeLog::open(SegmentedLog::open(dir.path(), 96).unwrap()).unwrap();
    for i in 0..20 {
        log.append(ChangeRecord::set(format!("k{i}"), "v", ts(i, "n"))).unwrap();
    }
    let before: Vec<u64> = log.read_after(12).unwrap().iter().map(|r| r.revision).collect();

    log.collect_segments(12).unwrap();

    let after: Vec<u64> = log.read_after(12).unwrap().iter().map(|r| r.revision).collect();
    assert_eq!(before, after);
    assert_eq!(after, (13..=20).collect::<Vec<_>>());
}
