//! Two-tier dedup store tests: persistence, filter rebuild, and the
//! single-writer lock.

use std::env;
use std::path::PathBuf;

use finbert_collector::dedup::SeenStore;
use finbert_collector::error::CollectorError;

fn scratch_db(name: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("finbert_dedup_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir.join("dupes.db")
}

#[test]
fn test_empty_store_reports_nothing_seen() {
    let db = scratch_db("empty");
    let store = SeenStore::open(&db, 1000).expect("open store");
    assert!(!store.seen("never_inserted").expect("query"));
}

#[test]
fn test_mark_seen_then_seen() {
    let db = scratch_db("mark");
    let mut store = SeenStore::open(&db, 1000).expect("open store");

    assert!(!store.seen("a1").expect("query"));
    store.mark_seen("a1", 1_700_000_000).expect("insert");
    assert!(store.seen("a1").expect("query"));

    // A second mark of the same id is harmless.
    store.mark_seen("a1", 1_700_000_999).expect("insert again");
    assert!(store.seen("a1").expect("query"));
}

#[test]
fn test_seen_survives_restart() {
    let db = scratch_db("restart");

    {
        let mut store = SeenStore::open(&db, 1000).expect("open store");
        store.mark_seen("persisted", 1_700_000_000).expect("insert");
        store.close().expect("close");
    }

    let store = SeenStore::open(&db, 1000).expect("reopen store");
    assert!(store.seen("persisted").expect("query"));
    assert!(!store.seen("unrelated").expect("query"));
}

#[test]
fn test_filter_rebuilt_on_restart() {
    let db = scratch_db("rebuild");

    {
        let mut store = SeenStore::open(&db, 1000).expect("open store");
        for i in 0..50 {
            store
                .mark_seen(&format!("post_{i}"), 1_700_000_000 + i)
                .expect("insert");
        }
        store.close().expect("close");
    }

    let store = SeenStore::open(&db, 1000).expect("reopen store");
    // Every persisted id must be back in the in-memory filter, otherwise
    // the no-false-negatives guarantee would rest on Tier B alone.
    for i in 0..50 {
        assert!(store.filter_contains(&format!("post_{i}")));
        assert!(store.seen(&format!("post_{i}")).expect("query"));
    }
}

#[test]
fn test_concurrent_open_is_lock_error() {
    let db = scratch_db("lock");
    let _holder = SeenStore::open(&db, 1000).expect("open store");

    let err = SeenStore::open(&db, 1000).unwrap_err();
    assert!(matches!(err, CollectorError::DedupLock(_)), "got {err:?}");
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_lock_released_on_close() {
    let db = scratch_db("unlock");
    let store = SeenStore::open(&db, 1000).expect("open store");
    store.close().expect("close");

    SeenStore::open(&db, 1000).expect("reopen after close");
}

#[test]
fn test_stats() {
    let db = scratch_db("stats");
    let mut store = SeenStore::open(&db, 1000).expect("open store");

    let stats = store.stats().expect("stats");
    assert_eq!(stats.total_ids, 0);
    assert_eq!(stats.oldest_first_seen, None);

    store.mark_seen("old", 100).expect("insert");
    store.mark_seen("new", 200).expect("insert");

    let stats = store.stats().expect("stats");
    assert_eq!(stats.total_ids, 2);
    assert_eq!(stats.oldest_first_seen, Some(100));
    assert_eq!(stats.newest_first_seen, Some(200));
    assert_eq!(stats.filter_capacity, 1000);
}

#[test]
fn test_capacity_overflow_does_not_fail_open() {
    let db = scratch_db("overflow");

    {
        let mut store = SeenStore::open(&db, 8).expect("open store");
        for i in 0..32 {
            store
                .mark_seen(&format!("over_{i}"), 1_700_000_000)
                .expect("insert");
        }
        store.close().expect("close");
    }

    // Reopen seeds 32 ids into a capacity-8 filter: degraded, not fatal.
    let store = SeenStore::open(&db, 8).expect("reopen store");
    for i in 0..32 {
        assert!(store.seen(&format!("over_{i}")).expect("query"));
    }
}
