//! Core types for the tweet cache.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Milliseconds since Unix epoch (UTC).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_millis())
    }

    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// Time elapsed since `earlier`, or `None` if `earlier` is in the future.
    pub fn duration_since(self, earlier: Timestamp) -> Option<Duration> {
        let delta = self.0.checked_sub(earlier.0)?;
        u64::try_from(delta).ok().map(Duration::from_millis)
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(millis))
    }

    pub fn saturating_sub(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_sub(millis))
    }

    /// Convert to a chrono datetime, if representable.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp(dt.timestamp_millis())
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// Structured sub-elements of an item's text.
///
/// Entries are kept as opaque JSON; only their presence drives selection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub urls: Vec<serde_json::Value>,
    #[serde(default)]
    pub mentions: Vec<serde_json::Value>,
    #[serde(default)]
    pub hashtags: Vec<serde_json::Value>,
    #[serde(default)]
    pub media: Vec<serde_json::Value>,
}

impl Entities {
    /// True if at least one url, mention, hashtag, or media entity exists.
    pub fn has_any(&self) -> bool {
        !(self.urls.is_empty()
            && self.mentions.is_empty()
            && self.hashtags.is_empty()
            && self.media.is_empty())
    }

    pub fn count(&self) -> usize {
        self.urls.len() + self.mentions.len() + self.hashtags.len() + self.media.len()
    }
}

/// A single cached upstream item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Upstream identifier. Missing ids deserialize empty and fail validation.
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub text: String,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub author_id: String,

    /// Upstream engagement metrics, passed through untouched.
    #[serde(default)]
    pub metrics: serde_json::Value,

    #[serde(default)]
    pub entities: Entities,

    #[serde(default)]
    pub edit_history_ids: Vec<String>,
}

impl Item {
    /// Check the invariants an item must hold to be displayed.
    pub fn validate(&self) -> Result<(), crate::CacheError> {
        if self.id.trim().is_empty() {
            return Err(crate::CacheError::Validation("missing id".into()));
        }
        if self.text.trim().is_empty() {
            return Err(crate::CacheError::Validation(format!(
                "item {} has empty text",
                self.id
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn has_entities(&self) -> bool {
        self.entities.has_any()
    }
}

/// One immutable, timestamp-keyed batch of fetched items.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub key: String,
    pub items: Vec<Item>,
    pub written_at: Timestamp,
}

/// The single, overwritten-in-place record of currently displayed items.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSet {
    pub items: Vec<Item>,
    pub written_at: Timestamp,
}

/// Listing entry for one stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    /// Backend-specific locator used for `get` and `delete`.
    pub url: String,
    pub size: u64,
    pub written_at: Timestamp,
}
