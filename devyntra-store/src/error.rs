//! Error types for the store

use devyntra_core::domain::ProjectId;
use devyntra_core::dto::job::PayloadError;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the queue and the project state store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No project record matches the id
    #[error("project not found: {0}")]
    NotFound(ProjectId),

    /// Database call failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A job could not be encoded for the queue
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// A stored row could not be mapped back to a domain type
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),

    /// Injected or backend-specific failure that is not a database error
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Unavailable(_))
    }
}
