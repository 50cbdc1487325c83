//! Storage backend trait.

use crate::error::Result;
use crate::types::ObjectInfo;
use async_trait::async_trait;

/// A flat object store addressed by key on write and by url on read.
///
/// `put` overwrites an existing key. Append-only behavior for snapshots is
/// the caller's responsibility (it always writes fresh keys).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Write `body` under `key`, returning the object's url.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<String>;

    /// Fetch an object body, or `None` if nothing is stored at `url`.
    async fn get(&self, url: &str) -> Result<Option<Vec<u8>>>;

    /// Delete an object. Returns whether anything was removed.
    async fn delete(&self, url: &str) -> Result<bool>;

    /// Resolve the url a key would be stored under.
    fn url_for(&self, key: &str) -> String;
}
