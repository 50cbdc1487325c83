//! Single-slot storage for the current selection.

use crate::backend::ObjectStore;
use crate::error::Result;
use crate::types::SelectionSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// The one stored "currently displayed" selection.
///
/// Writes overwrite unconditionally; concurrent writers resolve
/// last-writer-wins.
pub struct SelectionSlot {
    backend: Arc<dyn ObjectStore>,
    key: String,
}

impl SelectionSlot {
    pub fn new(backend: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Replace the stored selection.
    pub async fn write(&self, selection: &SelectionSet) -> Result<()> {
        let body = serde_json::to_vec(selection)?;
        self.backend.put(&self.key, body).await?;
        debug!(key = %self.key, items = selection.items.len(), "selection written");
        Ok(())
    }

    /// The stored selection, or `None` if none was written or it is unreadable.
    pub async fn read(&self) -> Result<Option<SelectionSet>> {
        let url = self.backend.url_for(&self.key);
        let Some(body) = self.backend.get(&url).await? else {
            return Ok(None);
        };

        match serde_json::from_slice(&body) {
            Ok(selection) => Ok(Some(selection)),
            Err(e) => {
                warn!(key = %self.key, error = %e, "corrupt selection body");
                Ok(None)
            }
        }
    }
}
