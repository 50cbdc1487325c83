//! Scheduler trigger handling.
//!
//! [`TriggerHandler::handle`] takes the raw `Authorization` header and
//! returns a status code and body, so it can be mounted in any HTTP server.

use crate::config::Environment;
use crate::error::{CacheError, Result};
use crate::orchestrator::{CycleReport, FetchOrchestrator};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{error, warn};

const BEARER_PREFIX: &str = "Bearer ";

/// Body of a trigger response.
#[derive(Clone, Debug, PartialEq)]
pub enum TriggerBody {
    Json(serde_json::Value),
    Text(String),
}

/// Status and body to send back to the scheduler.
#[derive(Clone, Debug, PartialEq)]
pub struct TriggerResponse {
    pub status: u16,
    pub body: TriggerBody,
}

impl TriggerResponse {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            body: TriggerBody::Json(value),
        }
    }

    fn text(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            body: TriggerBody::Text(text.into()),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self.body {
            TriggerBody::Json(_) => "application/json",
            TriggerBody::Text(_) => "text/plain; charset=utf-8",
        }
    }

    /// Serialized body bytes.
    pub fn body_bytes(&self) -> Vec<u8> {
        match &self.body {
            TriggerBody::Json(value) => value.to_string().into_bytes(),
            TriggerBody::Text(text) => text.clone().into_bytes(),
        }
    }
}

/// Authenticates scheduler triggers and runs a fetch cycle.
pub struct TriggerHandler {
    orchestrator: Arc<FetchOrchestrator>,
    secret: Option<String>,
    environment: Environment,
    deadline: Option<Duration>,
}

impl TriggerHandler {
    /// Handler using the orchestrator's configured secret and environment.
    pub fn new(orchestrator: Arc<FetchOrchestrator>) -> Self {
        let config = orchestrator.config();
        let secret = config.trigger_secret.clone();
        let environment = config.environment;
        Self {
            orchestrator,
            secret,
            environment,
            deadline: None,
        }
    }

    /// Bound each cycle by a wall-clock deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Check an `Authorization` header against the shared secret.
    pub fn authorize(&self, authorization: Option<&str>) -> Result<()> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| CacheError::Config("trigger secret is not configured".into()))?;

        let token = authorization
            .and_then(|h| h.strip_prefix(BEARER_PREFIX))
            .ok_or_else(|| CacheError::Auth("missing bearer token".into()))?;

        if bool::from(token.as_bytes().ct_eq(secret.as_bytes())) {
            Ok(())
        } else {
            Err(CacheError::Auth("bearer token mismatch".into()))
        }
    }

    /// Authenticate, run one cycle, and map the outcome to a response.
    pub async fn handle(&self, authorization: Option<&str>) -> TriggerResponse {
        if let Err(e) = self.authorize(authorization) {
            warn!(step = "auth", error = %e, "trigger rejected");
            return self.error_response(&e);
        }

        let outcome = match self.deadline {
            Some(deadline) => self.orchestrator.run_with_timeout(deadline).await,
            None => self.orchestrator.run().await,
        };

        match outcome {
            Ok(CycleReport::Completed(summary)) => TriggerResponse::json(
                200,
                json!({
                    "message": "Tweets fetched and cached successfully",
                    "tweetCount": summary.tweet_count,
                    "selectedCount": summary.selected_count,
                }),
            ),
            Ok(CycleReport::Blocked { retry_after }) => {
                let text = match retry_after {
                    Some(wait) => format!("Rate limited; retry in {}s", wait.as_secs().max(1)),
                    None => "Rate limited".to_string(),
                };
                TriggerResponse::text(429, text)
            }
            Err(e) => {
                if !e.is_not_found() {
                    error!(step = "trigger", error = %e, "fetch cycle failed");
                }
                self.error_response(&e)
            }
        }
    }

    fn error_response(&self, e: &CacheError) -> TriggerResponse {
        match e {
            CacheError::Auth(_) => TriggerResponse::text(401, "Unauthorized"),
            CacheError::NotFound(_) => TriggerResponse::text(404, "No tweets found"),
            other => {
                let body = if self.environment.is_production() {
                    json!({ "error": "Failed to fetch tweets" })
                } else {
                    json!({ "error": "Failed to fetch tweets", "details": other.to_string() })
                };
                TriggerResponse::json(other.status_code(), body)
            }
        }
    }
}
