//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// These are transport/infrastructure failures. Server-side *validation*
/// errors are data, not errors; they travel through the sync error ledger
/// as typed payloads from `fieldbook-types`.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// The backoff schedule was exhausted without a usable connection.
    #[error("data fetching failed")]
    DataFetchingFailed,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted-store error.
    #[error("store error: {0}")]
    Store(String),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,

    /// Entity not found.
    #[error("entity not found: {0}")]
    EntityNotFound(String),
}

impl SyncError {
    /// Whether this failure is transport-level and eligible for backoff
    /// retry (as opposed to validation, which never retries).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}
