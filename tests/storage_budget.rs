//! Storage budget enforcement across backends.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tweet_cache::testutil::item;
use tweet_cache::{
    FsObjectStore, ManualClock, MemoryObjectStore, ObjectStore, StorageReaper, StoreConfig,
    Timestamp, TweetCacheStore, BYTES_PER_MB,
};

const PREFIX: &str = "tweets/cache-";

fn key(n: i64) -> String {
    format!("{PREFIX}{n:013}")
}

#[tokio::test]
async fn test_five_ten_mb_snapshots_under_forty_mb_budget() {
    let backend = Arc::new(MemoryObjectStore::new());
    let ten_mb = (10 * BYTES_PER_MB) as usize;
    for i in 0..5 {
        backend.insert_raw(&key(i), vec![0u8; ten_mb], Timestamp(i * 60_000));
    }

    let reaper = StorageReaper::new(backend.clone(), PREFIX);
    let report = reaper.reap(40).await.unwrap();

    assert!(report.triggered);
    assert!(report.kept_bytes < 32 * BYTES_PER_MB);
    assert_eq!(report.kept_count, 3);
    assert_eq!(report.deleted_count, 2);
    assert_eq!(report.deleted_bytes, 20 * BYTES_PER_MB);

    let kept: Vec<String> = backend
        .list(PREFIX)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    assert_eq!(kept, vec![key(2), key(3), key(4)]);
}

#[tokio::test]
async fn test_exactly_at_budget_reaps() {
    let backend = Arc::new(MemoryObjectStore::new());
    let half_mb = (BYTES_PER_MB / 2) as usize;
    backend.insert_raw(&key(1), vec![0u8; half_mb], Timestamp(1));
    backend.insert_raw(&key(2), vec![0u8; half_mb], Timestamp(2));

    let report = StorageReaper::new(backend.clone(), PREFIX)
        .reap(1)
        .await
        .unwrap();

    assert!(report.triggered);
    assert_eq!(report.kept_count, 1);
    assert_eq!(backend.len(), 1);
}

#[tokio::test]
async fn test_write_time_orders_eviction_not_key() {
    let backend = Arc::new(MemoryObjectStore::new());
    // Key order and write order disagree; the newest write must survive.
    backend.insert_raw(&key(9), vec![0u8; 100], Timestamp(1_000));
    backend.insert_raw(&key(1), vec![0u8; 100], Timestamp(5_000));

    let report = StorageReaper::new(backend.clone(), PREFIX)
        .reap_bytes(150)
        .await
        .unwrap();

    assert_eq!(report.deleted_count, 1);
    let kept = backend.list(PREFIX).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].key, key(1));
}

#[tokio::test]
async fn test_store_and_reap_with_filesystem_backend() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(Timestamp(1_700_000_000_000)));
    let backend =
        Arc::new(FsObjectStore::with_clock(dir.path().join("objects"), 16, clock.clone()).unwrap());
    let store = TweetCacheStore::new(StoreConfig::default(), backend.clone(), clock.clone());

    let mut written = Vec::new();
    for round in 0..6 {
        let items = (0..20).map(|i| item(&format!("{round}-{i}"))).collect();
        written.push(store.put(items).await.unwrap());
        clock.advance(Duration::from_secs(900));
    }

    let snapshots = store.list_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 6);
    let one = snapshots[0].size;
    assert!(snapshots.iter().all(|s| s.written_at.as_millis() > 0));

    // A budget of four snapshots keeps three (80% of four).
    let reaper = StorageReaper::new(backend.clone(), store.key_prefix());
    let report = reaper.reap_bytes(one * 4 + one / 2).await.unwrap();
    assert!(report.triggered);
    assert_eq!(report.kept_count, 3);
    assert_eq!(report.deleted_count, 3);

    let latest = store.get_latest().await.unwrap().unwrap();
    assert_eq!(latest.key, written[5].key);

    // Reopen: only the three newest remain on disk.
    let reopened = FsObjectStore::new(dir.path().join("objects"), 16).unwrap();
    let keys: Vec<String> = reopened
        .list(&store.key_prefix())
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    let expected: Vec<String> = written[3..].iter().map(|s| s.key.clone()).collect();
    assert_eq!(keys, expected);
}
