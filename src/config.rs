//! Cache configuration.

use crate::error::{CacheError, Result};
use std::time::Duration;

/// Deployment environment. Controls how much error detail responses expose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Full configuration for a fetch cycle.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Key prefix for snapshots. Keys are `<prefix>-<millis>`.
    pub snapshot_prefix: String,

    /// Key of the single selection slot.
    pub selection_key: String,

    /// Key prefix for persisted rate state.
    pub rate_state_prefix: String,

    /// Maximum items per snapshot.
    /// Default: 100
    pub max_items: usize,

    /// Items chosen for display per cycle.
    /// Default: 4
    pub select_count: usize,

    /// Soft storage budget for snapshots, in megabytes.
    /// Default: 50
    pub budget_mb: u64,

    /// Minimum interval between upstream attempts.
    /// Default: 15 minutes
    pub rate_window: Duration,

    /// Upstream budget restored once its reset time passes.
    /// Default: 1
    pub rate_ceiling: i64,

    /// Items requested per upstream call.
    /// Default: 10
    pub page_size: usize,

    /// Account whose posts are fetched. Required.
    pub target_username: Option<String>,

    /// Shared secret expected as the trigger's bearer token.
    pub trigger_secret: Option<String>,

    pub environment: Environment,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot_prefix: "tweets/cache".to_string(),
            selection_key: "selection/current.json".to_string(),
            rate_state_prefix: "rate-state".to_string(),
            max_items: 100,
            select_count: 4,
            budget_mb: 50,
            rate_window: Duration::from_secs(15 * 60),
            rate_ceiling: 1,
            page_size: 10,
            target_username: None,
            trigger_secret: None,
            environment: Environment::Development,
        }
    }
}

/// Environment variable names read by [`CacheConfig::from_env`].
pub mod env {
    pub const SNAPSHOT_PREFIX: &str = "TWEET_CACHE_SNAPSHOT_PREFIX";
    pub const SELECTION_KEY: &str = "TWEET_CACHE_SELECTION_KEY";
    pub const RATE_STATE_PREFIX: &str = "TWEET_CACHE_RATE_STATE_PREFIX";
    pub const MAX_ITEMS: &str = "TWEET_CACHE_MAX_ITEMS";
    pub const SELECT_COUNT: &str = "TWEET_CACHE_SELECT_COUNT";
    pub const BUDGET_MB: &str = "TWEET_CACHE_BUDGET_MB";
    pub const RATE_WINDOW_SECS: &str = "TWEET_CACHE_RATE_WINDOW_SECS";
    pub const RATE_CEILING: &str = "TWEET_CACHE_RATE_CEILING";
    pub const PAGE_SIZE: &str = "TWEET_CACHE_PAGE_SIZE";
    pub const USERNAME: &str = "TWEET_CACHE_USERNAME";
    pub const TRIGGER_SECRET: &str = "TWEET_CACHE_TRIGGER_SECRET";
    pub const ENVIRONMENT: &str = "TWEET_CACHE_ENV";
}

impl CacheConfig {
    /// Build from `TWEET_CACHE_*` process environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            snapshot_prefix: text(env::SNAPSHOT_PREFIX).unwrap_or(defaults.snapshot_prefix),
            selection_key: text(env::SELECTION_KEY).unwrap_or(defaults.selection_key),
            rate_state_prefix: text(env::RATE_STATE_PREFIX).unwrap_or(defaults.rate_state_prefix),
            max_items: parse_or(text(env::MAX_ITEMS), env::MAX_ITEMS, defaults.max_items)?,
            select_count: parse_or(text(env::SELECT_COUNT), env::SELECT_COUNT, defaults.select_count)?,
            budget_mb: parse_or(text(env::BUDGET_MB), env::BUDGET_MB, defaults.budget_mb)?,
            rate_window: Duration::from_secs(parse_or(
                text(env::RATE_WINDOW_SECS),
                env::RATE_WINDOW_SECS,
                defaults.rate_window.as_secs(),
            )?),
            rate_ceiling: parse_or(text(env::RATE_CEILING), env::RATE_CEILING, defaults.rate_ceiling)?,
            page_size: parse_or(text(env::PAGE_SIZE), env::PAGE_SIZE, defaults.page_size)?,
            target_username: text(env::USERNAME),
            trigger_secret: text(env::TRIGGER_SECRET),
            environment: text(env::ENVIRONMENT)
                .map(|v| Environment::parse(&v))
                .unwrap_or(defaults.environment),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the settings every cycle depends on.
    ///
    /// A missing username is not checked here; it is reported when a fetch
    /// needs it, via [`CacheConfig::username`].
    pub fn validate(&self) -> Result<()> {
        if self.max_items == 0 {
            return Err(CacheError::Config("max_items must be at least 1".into()));
        }
        if self.page_size == 0 {
            return Err(CacheError::Config("page_size must be at least 1".into()));
        }
        if self.budget_mb == 0 {
            return Err(CacheError::Config("budget_mb must be at least 1".into()));
        }
        if self.snapshot_prefix.is_empty() {
            return Err(CacheError::Config("snapshot_prefix must not be empty".into()));
        }
        if self.selection_key.starts_with(&format!("{}-", self.snapshot_prefix)) {
            return Err(CacheError::Config(
                "selection_key must not live under the snapshot prefix".into(),
            ));
        }
        Ok(())
    }

    /// The target account, or a configuration error if unset.
    pub fn username(&self) -> Result<&str> {
        self.target_username
            .as_deref()
            .map(|u| u.trim_start_matches('@'))
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CacheError::Config("target username is not configured".into()))
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, name: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| CacheError::Config(format!("{name} is not a valid number: {raw}"))),
    }
}
