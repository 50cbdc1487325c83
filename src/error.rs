//! Error types for the tweet cache.

use thiserror::Error;

/// Main error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Unauthorized: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid item: {0}")]
    Validation(String),
}

impl CacheError {
    /// HTTP status a trigger response should carry for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            CacheError::Auth(_) => 401,
            CacheError::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// Whether this error is an expected empty state rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// Whether this error originated in the storage backend.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            CacheError::Storage(_)
                | CacheError::Io(_)
                | CacheError::Corruption(_)
                | CacheError::ChecksumMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
