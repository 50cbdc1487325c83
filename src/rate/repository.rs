//! Persistence of rate state between scheduler invocations.

use crate::backend::ObjectStore;
use crate::error::Result;
use crate::rate::RateState;
use std::sync::Arc;
use tracing::warn;

/// Reads and writes [`RateState`] records as JSON objects under a prefix.
pub struct RateStateRepository {
    backend: Arc<dyn ObjectStore>,
    prefix: String,
}

impl RateStateRepository {
    pub fn new(backend: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    fn key(&self, endpoint: &str) -> String {
        format!("{}/{}.json", self.prefix, endpoint)
    }

    /// Load the stored state for `endpoint`.
    ///
    /// An unparsable record is logged and treated as absent, which only
    /// loosens throttling for one cycle.
    pub async fn load(&self, endpoint: &str) -> Result<Option<RateState>> {
        let url = self.backend.url_for(&self.key(endpoint));
        let Some(body) = self.backend.get(&url).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<RateState>(&body) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(endpoint, error = %e, "discarding unparsable rate state");
                Ok(None)
            }
        }
    }

    /// Overwrite the stored state for `state.endpoint`.
    pub async fn save(&self, state: &RateState) -> Result<()> {
        let body = serde_json::to_vec(state)?;
        self.backend.put(&self.key(&state.endpoint), body).await?;
        Ok(())
    }
}
