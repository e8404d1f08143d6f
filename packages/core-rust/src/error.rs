//! Error taxonomy shared by the fetcher, table store and sync engine.

use crate::types::TableId;

/// Errors surfaced by sheet sync operations.
///
/// `Provider` and `Format` are transient: inside an automatic poll cycle
/// they only trigger backoff. Inside a user-initiated refresh or connect
/// they are returned to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Network or HTTP failure talking to the sheet-data provider.
    #[error("sheet provider request failed: {0}")]
    Provider(String),
    /// The value grid was too short or otherwise malformed.
    #[error("invalid sheet data: {0}")]
    Format(String),
    /// Missing, invalid or expired credential.
    #[error("authentication required: {0}")]
    Auth(String),
    /// The operation referenced an unknown table id.
    #[error("table not found: {0}")]
    NotFound(TableId),
    /// User input was rejected.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl SyncError {
    /// Whether the failure should be retried through polling backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::Format(_))
    }
}

/// Convenience alias for results carrying a [`SyncError`].
pub type SyncResult<T> = Result<T, SyncError>;
