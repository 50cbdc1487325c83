//! Shared test helpers: item builders and a scripted upstream source.

use crate::error::{CacheError, Result};
use crate::rate::UpstreamBudget;
use crate::types::{Entities, Item};
use crate::upstream::{FetchOutcome, RawAttachments, RawEntities, RawItem, SearchQuery, UpstreamSource};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A valid item without entities.
pub fn item(id: &str) -> Item {
    Item {
        id: id.to_string(),
        text: format!("post {id}"),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        author_id: "42".to_string(),
        metrics: json!({ "like_count": 0 }),
        entities: Entities::default(),
        edit_history_ids: vec![id.to_string()],
    }
}

/// A valid item carrying one url entity.
pub fn item_with_entities(id: &str) -> Item {
    let mut item = item(id);
    item.entities.urls.push(json!({ "url": format!("https://t.co/{id}") }));
    item
}

/// A raw upstream item; `with_link` adds a url entity and a media key.
pub fn raw_item(id: &str, with_link: bool) -> RawItem {
    RawItem {
        id: Some(id.to_string()),
        text: Some(format!("post {id}")),
        created_at: Some("2024-01-01T00:00:00Z".to_string()),
        author_id: Some("42".to_string()),
        public_metrics: Some(json!({ "like_count": 1 })),
        entities: with_link.then(|| RawEntities {
            urls: vec![json!({ "url": format!("https://t.co/{id}") })],
            ..Default::default()
        }),
        attachments: with_link.then(|| RawAttachments {
            media_keys: vec![format!("3_{id}")],
        }),
        edit_history_tweet_ids: Some(vec![id.to_string()]),
    }
}

/// Upstream source that replays queued responses in order.
///
/// Once the queue is empty every call fails with an upstream error.
#[derive(Default)]
pub struct ScriptedUpstream {
    responses: Mutex<VecDeque<Result<FetchOutcome>>>,
    queries: Mutex<Vec<SearchQuery>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_items(&self, items: Vec<RawItem>) {
        self.responses.lock().push_back(Ok(FetchOutcome {
            items,
            budget: None,
        }));
    }

    pub fn push_items_with_budget(&self, items: Vec<RawItem>, budget: UpstreamBudget) {
        self.responses.lock().push_back(Ok(FetchOutcome {
            items,
            budget: Some(budget),
        }));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Err(CacheError::Upstream(message.to_string())));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl UpstreamSource for ScriptedUpstream {
    async fn fetch(&self, query: &SearchQuery) -> Result<FetchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CacheError::Upstream("no scripted response".into())))
    }
}
