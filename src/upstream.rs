//! Upstream fetch boundary.
//!
//! The crate does not speak to the upstream API itself. Callers supply an
//! [`UpstreamSource`]; this module defines the query it receives, the raw
//! shape of what it returns, and how raw items become [`Item`]s.

use crate::error::{CacheError, Result};
use crate::rate::UpstreamBudget;
use crate::types::{Entities, Item, Timestamp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

/// Rate-limit key for the recent-search endpoint.
pub const SEARCH_ENDPOINT: &str = "tweets/search/recent";

/// Search for recent original posts with links by one author.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    pub username: String,
    pub page_size: usize,
}

impl SearchQuery {
    pub fn new(username: impl Into<String>, page_size: usize) -> Self {
        Self {
            username: username.into(),
            page_size,
        }
    }

    /// Query string: author filter, no replies or retweets, must carry a link.
    pub fn query_string(&self) -> String {
        format!("from:{} -is:retweet -is:reply has:links", self.username)
    }
}

/// Entities as the upstream reports them.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawEntities {
    #[serde(default)]
    pub urls: Vec<serde_json::Value>,
    #[serde(default)]
    pub mentions: Vec<serde_json::Value>,
    #[serde(default)]
    pub hashtags: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawAttachments {
    #[serde(default)]
    pub media_keys: Vec<String>,
}

/// One item as returned by the upstream. Every field may be absent.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub public_metrics: Option<serde_json::Value>,
    #[serde(default)]
    pub entities: Option<RawEntities>,
    #[serde(default)]
    pub attachments: Option<RawAttachments>,
    #[serde(default)]
    pub edit_history_tweet_ids: Option<Vec<String>>,
}

impl RawItem {
    /// Convert to an [`Item`], substituting `fetched_at` for a missing or
    /// malformed creation time and `[id]` for an empty edit history.
    ///
    /// No validation happens here; invalid items are filtered at selection.
    pub fn into_item(self, fetched_at: Timestamp) -> Item {
        let id = self.id.unwrap_or_default();

        let created_at = match self.created_at.as_deref().map(DateTime::parse_from_rfc3339) {
            Some(Ok(dt)) => dt.with_timezone(&Utc),
            other => {
                debug!(id = %id, raw = ?other, "repairing creation time with fetch time");
                fetched_at.to_datetime().unwrap_or_default()
            }
        };

        let raw_entities = self.entities.unwrap_or_default();
        let media = self
            .attachments
            .map(|a| {
                a.media_keys
                    .into_iter()
                    .map(|key| serde_json::json!({ "media_key": key }))
                    .collect()
            })
            .unwrap_or_default();

        let mut edit_history_ids = self.edit_history_tweet_ids.unwrap_or_default();
        if edit_history_ids.is_empty() && !id.is_empty() {
            edit_history_ids.push(id.clone());
        }

        Item {
            id,
            text: self.text.unwrap_or_default(),
            created_at,
            author_id: self.author_id.unwrap_or_default(),
            metrics: self.public_metrics.unwrap_or(serde_json::Value::Null),
            entities: Entities {
                urls: raw_entities.urls,
                mentions: raw_entities.mentions,
                hashtags: raw_entities.hashtags,
                media,
            },
            edit_history_ids,
        }
    }
}

/// Everything one upstream call produced.
#[derive(Clone, Debug, Default)]
pub struct FetchOutcome {
    pub items: Vec<RawItem>,

    /// Request budget reported alongside the response, if any.
    pub budget: Option<UpstreamBudget>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<RawItem>,
}

/// Parse a recent-search response body (`{"data": [...], ...}`).
///
/// A body without `data` means zero results; a body that is not a JSON
/// object of that shape is an upstream error.
pub fn parse_search_response(body: &[u8]) -> Result<Vec<RawItem>> {
    serde_json::from_slice::<SearchResponse>(body)
        .map(|r| r.data)
        .map_err(|e| CacheError::Upstream(format!("malformed search response: {e}")))
}

/// Convert a batch of raw items, all repaired against the same fetch time.
pub fn normalize(items: Vec<RawItem>, fetched_at: Timestamp) -> Vec<Item> {
    items.into_iter().map(|raw| raw.into_item(fetched_at)).collect()
}

/// A rate-limited source of items.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Key the rate gate tracks this source under.
    fn endpoint(&self) -> &str {
        SEARCH_ENDPOINT
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<FetchOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_string() {
        let query = SearchQuery::new("ferris", 10);
        assert_eq!(
            query.query_string(),
            "from:ferris -is:retweet -is:reply has:links"
        );
    }

    #[test]
    fn test_full_item_conversion() {
        let body = json!({
            "data": [{
                "id": "1700",
                "text": "new release https://t.co/x",
                "created_at": "2024-05-01T10:00:00.000Z",
                "author_id": "42",
                "public_metrics": {"like_count": 3},
                "entities": {"urls": [{"url": "https://t.co/x"}]},
                "attachments": {"media_keys": ["3_1"]},
                "edit_history_tweet_ids": ["1700"]
            }],
            "meta": {"result_count": 1}
        });
        let raw = parse_search_response(body.to_string().as_bytes()).unwrap();
        let items = normalize(raw, Timestamp(0));

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.id, "1700");
        assert_eq!(item.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(item.metrics["like_count"], 3);
        assert_eq!(item.entities.urls.len(), 1);
        assert_eq!(item.entities.media, vec![json!({"media_key": "3_1"})]);
        assert!(item.has_entities());
    }

    #[test]
    fn test_repairs_created_at_and_history() {
        let fetched_at = Timestamp(1_714_557_600_000);
        let raw = RawItem {
            id: Some("9".into()),
            text: Some("hi".into()),
            created_at: Some("yesterday".into()),
            ..Default::default()
        };

        let item = raw.into_item(fetched_at);
        assert_eq!(Timestamp::from(item.created_at), fetched_at);
        assert_eq!(item.edit_history_ids, vec!["9".to_string()]);
        assert!(!item.has_entities());
    }

    #[test]
    fn test_missing_data_is_empty() {
        let raw = parse_search_response(br#"{"meta":{"result_count":0}}"#).unwrap();
        assert!(raw.is_empty());
    }

    #[test]
    fn test_malformed_response_is_upstream_error() {
        let err = parse_search_response(b"<html>").unwrap_err();
        assert!(matches!(err, CacheError::Upstream(_)));
    }
}
