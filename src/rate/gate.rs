//! Rate limit gate implementation.

use crate::types::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Configuration for the rate limit gate.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    /// Minimum interval between upstream attempts.
    /// Default: 15 minutes
    pub window: Duration,

    /// Requests restored to the upstream budget once its reset time passes.
    /// Default: 1
    pub ceiling: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            ceiling: 1,
        }
    }
}

/// Request budget as last reported by the upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamBudget {
    pub remaining: i64,
    pub reset_at: Timestamp,
}

impl UpstreamBudget {
    fn is_exhausted(&self, now: Timestamp) -> bool {
        self.remaining <= 0 && now < self.reset_at
    }
}

/// Throttling state for one upstream endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateState {
    pub endpoint: String,

    /// When the last upstream attempt was made (successful or not).
    #[serde(default)]
    pub last_request_at: Option<Timestamp>,

    #[serde(default)]
    pub budget: Option<UpstreamBudget>,
}

impl RateState {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}

/// Answers whether an upstream fetch is permitted right now.
pub struct RateLimitGate {
    config: RateLimitConfig,
    states: RwLock<HashMap<String, RateState>>,
}

impl RateLimitGate {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Whether a request to `endpoint` may be made at `now`.
    ///
    /// True when no attempt has been recorded yet.
    pub fn can_request(&self, endpoint: &str, now: Timestamp) -> bool {
        self.retry_after(endpoint, now).is_none()
    }

    /// How long until `can_request` would pass, or `None` if it passes now.
    pub fn retry_after(&self, endpoint: &str, now: Timestamp) -> Option<Duration> {
        let states = self.states.read();
        let state = states.get(endpoint)?;

        let wait_until = |at: Timestamp| at.duration_since(now).unwrap_or(Duration::MAX);

        let cooldown = state.last_request_at.and_then(|last| {
            let open_at = last.saturating_add(self.config.window);
            (now < open_at).then(|| wait_until(open_at))
        });

        let budget = state
            .budget
            .filter(|b| b.is_exhausted(now))
            .map(|b| wait_until(b.reset_at));

        match (cooldown, budget) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Record an attempted request. Called whether or not the attempt succeeded.
    pub fn record_request(&self, endpoint: &str, now: Timestamp) {
        let mut states = self.states.write();
        let state = states
            .entry(endpoint.to_string())
            .or_insert_with(|| RateState::new(endpoint));
        state.last_request_at = Some(now);
    }

    /// Store the budget reported by the upstream alongside a response.
    pub fn record_budget(&self, endpoint: &str, remaining: i64, reset_at: Timestamp) {
        let mut states = self.states.write();
        let state = states
            .entry(endpoint.to_string())
            .or_insert_with(|| RateState::new(endpoint));
        state.budget = Some(UpstreamBudget {
            remaining,
            reset_at,
        });
    }

    /// Restore the upstream budget to the configured ceiling once its reset
    /// time has passed. Returns whether a reset happened.
    ///
    /// `can_request` already treats an expired budget as reset; this only
    /// makes the reset visible in the recorded state.
    pub fn reset_if_expired(&self, endpoint: &str, now: Timestamp) -> bool {
        let mut states = self.states.write();
        let Some(budget) = states.get_mut(endpoint).and_then(|s| s.budget.as_mut()) else {
            return false;
        };

        if now >= budget.reset_at && budget.remaining < self.config.ceiling {
            debug!(endpoint, remaining = budget.remaining, "upstream budget reset");
            budget.remaining = self.config.ceiling;
            true
        } else {
            false
        }
    }

    /// Current recorded state for `endpoint`.
    pub fn state(&self, endpoint: &str) -> RateState {
        self.states
            .read()
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| RateState::new(endpoint))
    }

    /// Replace the recorded state for an endpoint, e.g. after loading it from storage.
    pub fn restore(&self, state: RateState) {
        self.states.write().insert(state.endpoint.clone(), state);
    }
}
