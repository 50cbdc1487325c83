//! Soft storage budget enforcement for snapshots.

use crate::backend::ObjectStore;
use crate::error::Result;
use crate::store::snapshot_suffix;
use crate::types::ObjectInfo;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bytes per megabyte as used by storage budgets.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// After eviction, kept snapshots must total less than this share of the
/// budget (numerator / denominator), so the next write does not immediately
/// trigger another eviction.
const RETAIN_NUMERATOR: u64 = 4;
const RETAIN_DENOMINATOR: u64 = 5;

/// Result of one reap pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Whether the budget was exceeded and eviction ran.
    pub triggered: bool,
    pub kept_count: usize,
    pub deleted_count: usize,
    pub kept_bytes: u64,
    pub deleted_bytes: u64,
    /// Keys that could not be deleted, with the error.
    pub errors: Vec<(String, String)>,
}

/// Deletes the oldest snapshots once their total size crosses a budget.
pub struct StorageReaper {
    backend: Arc<dyn ObjectStore>,

    /// Only keys made of this prefix and a numeric suffix are considered.
    key_prefix: String,
}

impl StorageReaper {
    pub fn new(backend: Arc<dyn ObjectStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
        }
    }

    /// Enforce a budget given in megabytes.
    pub async fn reap(&self, budget_mb: u64) -> Result<ReapReport> {
        self.reap_bytes(budget_mb.saturating_mul(BYTES_PER_MB)).await
    }

    /// Enforce a budget given in bytes.
    ///
    /// Below budget this is a no-op. Otherwise snapshots are walked newest
    /// first and kept while their running total stays under 80% of the
    /// budget; everything after the first one that does not fit is deleted.
    /// The newest snapshot is always kept.
    pub async fn reap_bytes(&self, budget_bytes: u64) -> Result<ReapReport> {
        let mut snapshots: Vec<ObjectInfo> = self
            .backend
            .list(&self.key_prefix)
            .await?
            .into_iter()
            .filter(|info| snapshot_suffix(&self.key_prefix, &info.key).is_some())
            .collect();
        let total: u64 = snapshots.iter().map(|s| s.size).sum();

        if total < budget_bytes {
            debug!(total, budget_bytes, count = snapshots.len(), "under storage budget");
            return Ok(ReapReport {
                kept_count: snapshots.len(),
                kept_bytes: total,
                ..Default::default()
            });
        }

        order_newest_first(&mut snapshots);
        let retain_limit = (u128::from(budget_bytes) * u128::from(RETAIN_NUMERATOR)
            / u128::from(RETAIN_DENOMINATOR)) as u64;

        let mut report = ReapReport {
            triggered: true,
            ..Default::default()
        };
        let mut keeping = true;

        for (i, snapshot) in snapshots.into_iter().enumerate() {
            if keeping && (i == 0 || report.kept_bytes + snapshot.size < retain_limit) {
                report.kept_count += 1;
                report.kept_bytes += snapshot.size;
                continue;
            }
            keeping = false;

            match self.backend.delete(&snapshot.url).await {
                Ok(_) => {
                    report.deleted_count += 1;
                    report.deleted_bytes += snapshot.size;
                }
                Err(e) => {
                    warn!(key = %snapshot.key, error = %e, "failed to delete snapshot");
                    report.errors.push((snapshot.key, e.to_string()));
                }
            }
        }

        info!(
            total,
            budget_bytes,
            kept = report.kept_count,
            deleted = report.deleted_count,
            freed = report.deleted_bytes,
            "storage budget enforced"
        );
        Ok(report)
    }
}

/// Sort by write time descending; equal times fall back to key ascending.
fn order_newest_first(snapshots: &mut [ObjectInfo]) {
    snapshots.sort_by(|a, b| {
        b.written_at
            .cmp(&a.written_at)
            .then_with(|| a.key.cmp(&b.key))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryObjectStore;
    use crate::types::Timestamp;

    const PREFIX: &str = "tweets/cache-";

    fn seed(backend: &MemoryObjectStore, sizes: &[u64]) {
        for (i, size) in sizes.iter().enumerate() {
            backend.insert_raw(
                &format!("{PREFIX}{:013}", i),
                vec![0u8; *size as usize],
                Timestamp(i as i64 * 1_000),
            );
        }
    }

    #[tokio::test]
    async fn test_under_budget_is_noop() {
        let backend = Arc::new(MemoryObjectStore::new());
        seed(&backend, &[100, 100, 100]);

        let reaper = StorageReaper::new(backend.clone(), PREFIX);
        let report = reaper.reap_bytes(1_000).await.unwrap();

        assert!(!report.triggered);
        assert_eq!(report.kept_count, 3);
        assert_eq!(report.deleted_count, 0);
        assert_eq!(backend.len(), 3);
    }

    #[tokio::test]
    async fn test_evicts_oldest_below_safety_margin() {
        let backend = Arc::new(MemoryObjectStore::new());
        seed(&backend, &[100, 100, 100, 100, 100]);

        let reaper = StorageReaper::new(backend.clone(), PREFIX);
        let report = reaper.reap_bytes(400).await.unwrap();

        assert!(report.triggered);
        assert_eq!(report.kept_count, 3);
        assert_eq!(report.deleted_count, 2);
        assert!(report.kept_bytes < 320);

        let remaining: Vec<String> = backend
            .list(PREFIX)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(
            remaining,
            vec![
                format!("{PREFIX}{:013}", 2),
                format!("{PREFIX}{:013}", 3),
                format!("{PREFIX}{:013}", 4),
            ]
        );
    }

    #[tokio::test]
    async fn test_never_touches_other_namespaces() {
        let backend = Arc::new(MemoryObjectStore::new());
        seed(&backend, &[500, 500]);
        backend.insert_raw("selection/current.json", vec![0u8; 5_000], Timestamp(0));

        let reaper = StorageReaper::new(backend.clone(), PREFIX);
        let report = reaper.reap_bytes(600).await.unwrap();

        assert_eq!(report.deleted_count, 1);
        let selection = backend.url_for("selection/current.json");
        assert!(backend.get(&selection).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ignores_keys_without_numeric_suffix() {
        let backend = Arc::new(MemoryObjectStore::new());
        seed(&backend, &[100, 100]);
        backend.insert_raw(&format!("{PREFIX}latest"), vec![0u8; 5_000], Timestamp(9_000));

        let reaper = StorageReaper::new(backend.clone(), PREFIX);
        let report = reaper.reap_bytes(1_000).await.unwrap();

        assert!(!report.triggered);
        assert_eq!(report.kept_count, 2);
        assert_eq!(report.kept_bytes, 200);
        assert_eq!(backend.len(), 3);
    }

    #[tokio::test]
    async fn test_newest_survives_oversized_write() {
        let backend = Arc::new(MemoryObjectStore::new());
        seed(&backend, &[10, 10, 1_000]);

        let reaper = StorageReaper::new(backend.clone(), PREFIX);
        let report = reaper.reap_bytes(500).await.unwrap();

        assert_eq!(report.kept_count, 1);
        assert_eq!(report.deleted_count, 2);
        assert_eq!(backend.list(PREFIX).await.unwrap()[0].size, 1_000);
    }

    #[tokio::test]
    async fn test_delete_failures_are_reported() {
        let backend = Arc::new(MemoryObjectStore::new());
        seed(&backend, &[100, 100, 100]);
        backend.fail_writes(true);

        let reaper = StorageReaper::new(backend.clone(), PREFIX);
        let report = reaper.reap_bytes(200).await.unwrap();

        assert_eq!(report.deleted_count, 0);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(backend.len(), 3);
    }

    #[test]
    fn test_equal_times_order_by_key() {
        let info = |key: &str, at: i64| ObjectInfo {
            key: key.to_string(),
            url: key.to_string(),
            size: 1,
            written_at: Timestamp(at),
        };
        let mut snapshots = vec![info("c", 5), info("b", 5), info("a", 1), info("d", 9)];
        order_newest_first(&mut snapshots);

        let keys: Vec<&str> = snapshots.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["d", "b", "c", "a"]);
    }
}
