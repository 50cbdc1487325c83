//! Fetch cycle orchestration.
//!
//! One call to [`FetchOrchestrator::run`] walks a single cycle:
//!
//! ```text
//! Idle → RateCheck → Blocked ─────────────────────────────────────┐
//!                  → Fetching → FetchFailed ───────────────────────┤
//!                             → Fetched → Caching → Reaping        │
//!                                                 → Selecting → Idle
//! ```
//!
//! There is no retry inside a cycle; the next scheduled run is the retry.

use crate::backend::ObjectStore;
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::rate::{RateLimitConfig, RateLimitGate, RateStateRepository};
use crate::reaper::{ReapReport, StorageReaper};
use crate::selection::{SelectionEngine, SelectionSlot};
use crate::store::{StoreConfig, TweetCacheStore};
use crate::upstream::{normalize, FetchOutcome, SearchQuery, UpstreamSource};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Steps of a fetch cycle, used as the `step` label on every log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleStep {
    Idle,
    RateCheck,
    Blocked,
    Fetching,
    FetchFailed,
    Fetched,
    Caching,
    Reaping,
    Selecting,
}

impl CycleStep {
    pub fn label(self) -> &'static str {
        match self {
            CycleStep::Idle => "idle",
            CycleStep::RateCheck => "rate_check",
            CycleStep::Blocked => "blocked",
            CycleStep::Fetching => "fetching",
            CycleStep::FetchFailed => "fetch_failed",
            CycleStep::Fetched => "fetched",
            CycleStep::Caching => "caching",
            CycleStep::Reaping => "reaping",
            CycleStep::Selecting => "selecting",
        }
    }
}

impl fmt::Display for CycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a completed cycle did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Items returned by the upstream.
    pub tweet_count: usize,
    /// Items written to the selection slot (0 if selection was skipped).
    pub selected_count: usize,
    /// Key of the snapshot written, if the cache write succeeded.
    pub snapshot_key: Option<String>,
    /// Reaper outcome, if it ran and succeeded.
    pub reap: Option<ReapReport>,
}

impl CycleSummary {
    pub fn cached(&self) -> bool {
        self.snapshot_key.is_some()
    }
}

/// Outcome of one cycle that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleReport {
    /// The rate gate refused the fetch.
    Blocked { retry_after: Option<Duration> },
    Completed(CycleSummary),
}

/// Sequences rate check, fetch, caching, reaping, and selection.
///
/// Holds every collaborator explicitly; build one per process and share it.
pub struct FetchOrchestrator {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    upstream: Arc<dyn UpstreamSource>,
    gate: RateLimitGate,
    rate_states: RateStateRepository,
    store: TweetCacheStore,
    reaper: StorageReaper,
    selection: SelectionEngine,
}

impl FetchOrchestrator {
    pub fn new(
        config: CacheConfig,
        backend: Arc<dyn ObjectStore>,
        upstream: Arc<dyn UpstreamSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let store = TweetCacheStore::new(
            StoreConfig {
                prefix: config.snapshot_prefix.clone(),
                max_items: config.max_items,
            },
            Arc::clone(&backend),
            Arc::clone(&clock),
        );
        let reaper = StorageReaper::new(Arc::clone(&backend), store.key_prefix());
        let slot = SelectionSlot::new(Arc::clone(&backend), config.selection_key.clone());
        let selection = SelectionEngine::new(config.select_count, slot);
        let gate = RateLimitGate::new(RateLimitConfig {
            window: config.rate_window,
            ceiling: config.rate_ceiling,
        });
        let rate_states = RateStateRepository::new(backend, config.rate_state_prefix.clone());

        Ok(Self {
            config,
            clock,
            upstream,
            gate,
            rate_states,
            store,
            reaper,
            selection,
        })
    }

    /// Use a fixed selection seed, for reproducible runs.
    pub fn with_selection_seed(mut self, seed: u64) -> Self {
        let slot = SelectionSlot::new(self.store.backend(), self.config.selection_key.clone());
        self.selection = SelectionEngine::seeded(self.config.select_count, slot, seed);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &TweetCacheStore {
        &self.store
    }

    pub fn selection(&self) -> &SelectionEngine {
        &self.selection
    }

    pub fn gate(&self) -> &RateLimitGate {
        &self.gate
    }

    /// Run one cycle under a wall-clock deadline. Expiry is an upstream error.
    pub async fn run_with_timeout(&self, deadline: Duration) -> Result<CycleReport> {
        match tokio::time::timeout(deadline, self.run()).await {
            Ok(result) => result,
            Err(_) => {
                error!(step = %CycleStep::FetchFailed, ?deadline, "fetch cycle timed out");
                Err(CacheError::Upstream(format!(
                    "fetch cycle exceeded {}ms deadline",
                    deadline.as_millis()
                )))
            }
        }
    }

    /// Run one cycle.
    ///
    /// Returns `Blocked` when throttled, `NotFound` when the upstream had no
    /// items, and an upstream or config error when fetching is impossible.
    /// Storage failures after a successful fetch are logged and reflected in
    /// the summary, never returned.
    pub async fn run(&self) -> Result<CycleReport> {
        let username = self.config.username()?.to_string();
        let endpoint = self.upstream.endpoint().to_string();

        let now = self.clock.now();
        debug!(step = %CycleStep::RateCheck, endpoint = %endpoint, "checking rate gate");
        match self.rate_states.load(&endpoint).await {
            Ok(Some(state)) => self.gate.restore(state),
            Ok(None) => {}
            Err(e) => warn!(step = %CycleStep::RateCheck, error = %e, "rate state unavailable"),
        }
        self.gate.reset_if_expired(&endpoint, now);

        if !self.gate.can_request(&endpoint, now) {
            let retry_after = self.gate.retry_after(&endpoint, now);
            info!(step = %CycleStep::Blocked, endpoint = %endpoint, ?retry_after, "fetch deferred");
            return Ok(CycleReport::Blocked { retry_after });
        }

        // The attempt is recorded before the call so a fetch cut short by a
        // deadline still starts the cooldown.
        self.gate.record_request(&endpoint, now);
        self.persist_rate_state(&endpoint).await;

        let query = SearchQuery::new(username, self.config.page_size);
        debug!(step = %CycleStep::Fetching, query = %query.query_string(), "fetching upstream");
        let fetched = self.upstream.fetch(&query).await;

        if let Ok(FetchOutcome {
            budget: Some(budget),
            ..
        }) = &fetched
        {
            self.gate.record_budget(&endpoint, budget.remaining, budget.reset_at);
            self.persist_rate_state(&endpoint).await;
        }

        let outcome = match fetched {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(step = %CycleStep::FetchFailed, error = %e, "upstream fetch failed");
                return Err(match e {
                    CacheError::Upstream(_) | CacheError::Config(_) => e,
                    other => CacheError::Upstream(other.to_string()),
                });
            }
        };

        let items = normalize(outcome.items, now);
        let mut summary = CycleSummary {
            tweet_count: items.len(),
            ..Default::default()
        };
        info!(step = %CycleStep::Fetched, count = items.len(), "upstream returned items");
        if items.is_empty() {
            return Err(CacheError::NotFound("upstream returned no items".into()));
        }

        let snapshot = match self.store.put(items).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(step = %CycleStep::Caching, error = %e, "cache write failed; skipping selection");
                return Ok(CycleReport::Completed(summary));
            }
        };
        summary.snapshot_key = Some(snapshot.key.clone());

        match self.reaper.reap(self.config.budget_mb).await {
            Ok(report) => summary.reap = Some(report),
            Err(e) => warn!(step = %CycleStep::Reaping, error = %e, "reap failed"),
        }

        match self
            .selection
            .select_and_persist(&snapshot.items, self.clock.now())
            .await
        {
            Ok(selection) => summary.selected_count = selection.items.len(),
            Err(e) => warn!(step = %CycleStep::Selecting, error = %e, "selection write failed"),
        }

        info!(
            step = %CycleStep::Idle,
            tweets = summary.tweet_count,
            selected = summary.selected_count,
            "fetch cycle complete"
        );
        Ok(CycleReport::Completed(summary))
    }

    async fn persist_rate_state(&self, endpoint: &str) {
        if let Err(e) = self.rate_states.save(&self.gate.state(endpoint)).await {
            warn!(step = %CycleStep::Fetching, error = %e, "failed to persist rate state");
        }
    }
}
