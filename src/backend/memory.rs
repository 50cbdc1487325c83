//! In-memory object store, for tests and local development.

use crate::backend::ObjectStore;
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::types::{ObjectInfo, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const URL_SCHEME: &str = "memory://";

#[derive(Clone)]
struct StoredObject {
    body: Vec<u8>,
    written_at: Timestamp,
}

/// Object store backed by an ordered map.
///
/// Write and list failures can be switched on to exercise best-effort paths.
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    clock: Arc<dyn Clock>,
    fail_writes: AtomicBool,
    fail_lists: AtomicBool,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Stamp writes with times from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            clock,
            fail_writes: AtomicBool::new(false),
            fail_lists: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `put` and `delete` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `list` fail.
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Insert raw bytes with an explicit write time, bypassing the clock.
    pub fn insert_raw(&self, key: &str, body: Vec<u8>, written_at: Timestamp) {
        self.objects
            .write()
            .insert(key.to_string(), StoredObject { body, written_at });
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Total bytes held across all keys.
    pub fn total_size(&self) -> u64 {
        self.objects
            .read()
            .values()
            .map(|o| o.body.len() as u64)
            .sum()
    }

    fn key_from_url<'a>(&self, url: &'a str) -> Result<&'a str> {
        url.strip_prefix(URL_SCHEME)
            .ok_or_else(|| CacheError::Storage(format!("not a memory url: {url}")))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(CacheError::Storage("list failed (injected)".into()));
        }

        let objects = self.objects.read();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                url: self.url_for(key),
                size: object.body.len() as u64,
                written_at: object.written_at,
            })
            .collect())
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Storage(format!("put {key} failed (injected)")));
        }

        let written_at = self.clock.now();
        self.objects
            .write()
            .insert(key.to_string(), StoredObject { body, written_at });
        Ok(self.url_for(key))
    }

    async fn get(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let key = self.key_from_url(url)?;
        Ok(self.objects.read().get(key).map(|o| o.body.clone()))
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Storage(format!("delete {url} failed (injected)")));
        }

        let key = self.key_from_url(url)?;
        Ok(self.objects.write().remove(key).is_some())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{URL_SCHEME}{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryObjectStore::new();

        let url = store.put("a/1", b"one".to_vec()).await.unwrap();
        assert_eq!(url, "memory://a/1");
        assert_eq!(store.get(&url).await.unwrap(), Some(b"one".to_vec()));

        assert!(store.delete(&url).await.unwrap());
        assert!(!store.delete(&url).await.unwrap());
        assert_eq!(store.get(&url).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_respects_prefix() {
        let clock = Arc::new(ManualClock::new(Timestamp(42)));
        let store = MemoryObjectStore::with_clock(clock);

        store.put("tweets/cache-1", b"x".to_vec()).await.unwrap();
        store.put("tweets/cache-2", b"yy".to_vec()).await.unwrap();
        store.put("selection/current", b"z".to_vec()).await.unwrap();

        let listed = store.list("tweets/").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].key, "tweets/cache-2");
        assert_eq!(listed[1].size, 2);
        assert_eq!(listed[0].written_at, Timestamp(42));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryObjectStore::new();
        store.fail_writes(true);
        assert!(store.put("k", vec![1]).await.is_err());

        store.fail_writes(false);
        store.fail_lists(true);
        store.put("k", vec![1]).await.unwrap();
        assert!(matches!(store.list("").await, Err(CacheError::Storage(_))));
    }

    #[tokio::test]
    async fn test_rejects_foreign_url() {
        let store = MemoryObjectStore::new();
        assert!(store.get("file:///etc/passwd").await.is_err());
    }
}
