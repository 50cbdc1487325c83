//! # Tweet Cache
//!
//! A bounded, rate-aware cache for items pulled from a rate-limited
//! upstream, with an entity-biased random selector for display.
//!
//! ## Core Concepts
//!
//! - **Snapshots**: Immutable, timestamp-keyed batches of fetched items
//! - **Selection slot**: The single, overwritten record of displayed items
//! - **Rate gate**: Local cooldown plus upstream-reported budget
//! - **Reaper**: Soft storage budget with a 20% safety margin
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tweet_cache::{CacheConfig, FetchOrchestrator, FsObjectStore, SystemClock};
//!
//! let config = CacheConfig::from_env()?;
//! let backend = Arc::new(FsObjectStore::new("./cache", 64)?);
//! let orchestrator = FetchOrchestrator::new(config, backend, upstream, Arc::new(SystemClock))?;
//!
//! // One cycle: rate check, fetch, cache, reap, select.
//! let report = orchestrator.run().await?;
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod rate;
pub mod reaper;
pub mod selection;
pub mod store;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::unwrap_used)]
pub mod testutil;
pub mod trigger;
pub mod types;
pub mod upstream;

// Re-exports
pub use backend::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, Environment};
pub use error::{CacheError, Result};
pub use orchestrator::{CycleReport, CycleStep, CycleSummary, FetchOrchestrator};
pub use rate::{RateLimitConfig, RateLimitGate, RateState, RateStateRepository, UpstreamBudget};
pub use reaper::{ReapReport, StorageReaper, BYTES_PER_MB};
pub use selection::{select_items, validate_pool, SelectionEngine, SelectionSlot, ValidatedPool};
pub use store::{StoreConfig, TweetCacheStore};
pub use trigger::{TriggerBody, TriggerHandler, TriggerResponse};
pub use types::*;
pub use upstream::{
    normalize, parse_search_response, FetchOutcome, RawItem, SearchQuery, UpstreamSource,
    SEARCH_ENDPOINT,
};
