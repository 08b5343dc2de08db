//! Error types for duet-relay.

use duet_types::UserId;

/// Main error type for duet-relay operations.
///
/// Configuration and startup failures are reported by the binary; only
/// failures that can happen while handling an update surface here.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Storage error. The directory could not serve the request; the
    /// triggering operation failed and is not retried by the relay.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Directory (storage layer) errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A point update referenced a user with no record.
    #[error("user not found: {user}")]
    NotFound {
        /// The missing user.
        user: UserId,
    },

    /// A stored row could not be decoded into a record.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Optimistic updates on this user kept losing to concurrent writers.
    #[error("too much contention on user {user}")]
    Contended {
        /// The contended user.
        user: UserId,
    },
}

/// Outbound delivery errors.
///
/// These never fail a core operation: they are logged and counted.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The transport rejected or lost the message.
    #[error("delivery to {user} failed: {reason}")]
    Delivery {
        /// Intended recipient.
        user: UserId,
        /// Transport-specific reason.
        reason: String,
    },
}
