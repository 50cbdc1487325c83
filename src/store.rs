//! Append-only snapshot storage for fetched items.

use crate::backend::ObjectStore;
use crate::clock::Clock;
use crate::error::{CacheError, Result};
use crate::types::{Item, ObjectInfo, Snapshot, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Width of the zero-padded millisecond suffix. Covers every time up to
/// the year 2286, so lexicographic key order is chronological order.
const SUFFIX_WIDTH: usize = 13;

/// Snapshot store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Key prefix shared by all snapshots.
    pub prefix: String,

    /// Maximum items kept per snapshot.
    /// Default: 100
    pub max_items: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            prefix: "tweets/cache".to_string(),
            max_items: 100,
        }
    }
}

/// Millisecond suffix of `key` if it is `key_prefix` followed only by digits.
pub(crate) fn snapshot_suffix(key_prefix: &str, key: &str) -> Option<i64> {
    let suffix = key.strip_prefix(key_prefix)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Durable, timestamp-versioned snapshot storage.
///
/// Every `put` writes a new key; existing snapshots are never rewritten.
pub struct TweetCacheStore {
    config: StoreConfig,
    backend: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,

    /// Last suffix handed out, so two writes in one millisecond still get
    /// distinct, ordered keys.
    last_suffix: Mutex<i64>,
}

impl TweetCacheStore {
    pub fn new(config: StoreConfig, backend: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            backend,
            clock,
            last_suffix: Mutex::new(i64::MIN),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.backend)
    }

    /// Prefix every snapshot key starts with, including the separator.
    pub fn key_prefix(&self) -> String {
        format!("{}-", self.config.prefix)
    }

    fn snapshot_key(&self, suffix: i64) -> String {
        format!("{}-{:0width$}", self.config.prefix, suffix, width = SUFFIX_WIDTH)
    }

    /// Extract the millisecond suffix from a snapshot key, if it is one.
    pub fn parse_suffix(&self, key: &str) -> Option<i64> {
        snapshot_suffix(&self.key_prefix(), key)
    }

    fn next_suffix(&self, now: Timestamp) -> i64 {
        let mut last = self.last_suffix.lock();
        let suffix = if now.0 > *last { now.0 } else { *last + 1 };
        *last = suffix;
        suffix
    }

    /// Write a new snapshot of at most `max_items` items, in input order.
    pub async fn put(&self, mut items: Vec<Item>) -> Result<Snapshot> {
        let received = items.len();
        items.truncate(self.config.max_items);

        let written_at = self.clock.now();
        let key = self.snapshot_key(self.next_suffix(written_at));
        let snapshot = Snapshot {
            key: key.clone(),
            items,
            written_at,
        };

        let body = serde_json::to_vec(&snapshot)?;
        let bytes = body.len();
        self.backend.put(&key, body).await?;

        debug!(
            key = %key,
            items = snapshot.items.len(),
            dropped = received - snapshot.items.len(),
            bytes,
            "snapshot written"
        );
        Ok(snapshot)
    }

    /// All snapshots under the prefix, oldest key first.
    pub async fn list_snapshots(&self) -> Result<Vec<ObjectInfo>> {
        let mut snapshots: Vec<ObjectInfo> = self
            .backend
            .list(&self.key_prefix())
            .await?
            .into_iter()
            .filter(|info| self.parse_suffix(&info.key).is_some())
            .collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(snapshots)
    }

    /// The most recent snapshot, or `None` when the cache is empty.
    ///
    /// A snapshot whose frame or body is damaged is logged and reported as
    /// `None`; listing and IO failures are returned as errors.
    pub async fn get_latest(&self) -> Result<Option<Snapshot>> {
        let Some(latest) = self.list_snapshots().await?.pop() else {
            return Ok(None);
        };

        let body = match self.backend.get(&latest.url).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                debug!(key = %latest.key, "latest snapshot vanished before read");
                return Ok(None);
            }
            Err(e @ (CacheError::Corruption(_) | CacheError::ChecksumMismatch { .. })) => {
                warn!(key = %latest.key, error = %e, "corrupt snapshot frame");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match serde_json::from_slice::<Snapshot>(&body) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(key = %latest.key, error = %e, "corrupt snapshot body");
                Ok(None)
            }
        }
    }
}
