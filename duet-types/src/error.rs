//! Error types for duet.

use thiserror::Error;

use crate::{PeerState, UserId};

/// Errors shared across duet crates.
#[derive(Debug, Error)]
pub enum DuetError {
    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A state transition that the lifecycle does not allow
    #[error("invalid transition for {user}: {from} cannot {action}")]
    InvalidTransition {
        /// The participant.
        user: UserId,
        /// State the participant was in.
        from: PeerState,
        /// The attempted action.
        action: &'static str,
    },

    /// A directory record broke a pairing invariant
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}
