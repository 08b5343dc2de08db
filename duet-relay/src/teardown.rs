//! Teardown coordinator.
//!
//! Ends a session or cancels a search. Both sides of a pairing are reset in
//! one directory operation, so no observer ever sees a half-ended session.

use crate::error::StorageError;
use crate::server::{PairRelay, RelayMetrics};
use duet_types::{PeerState, UserId};
use serde::Serialize;

/// Result of a leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LeaveOutcome {
    /// Nothing to end.
    AlreadyIdle,
    /// Left the waiting pool.
    StoppedSeeking,
    /// Session ended.
    Ended {
        /// The partner that was reset too, if they still pointed back.
        partner: Option<UserId>,
    },
}

impl PairRelay {
    /// Return `user` (and a paired partner) to idle.
    ///
    /// Idempotent: leaving while idle, or as an unknown user, changes
    /// nothing and notifies nobody.
    pub async fn leave(&self, user: UserId) -> Result<LeaveOutcome, StorageError> {
        let release = self
            .directory()
            .release(user)
            .await
            .map_err(|e| self.storage_failed(e))?;

        let outcome = match release.previous {
            PeerState::Idle => {
                tracing::debug!("Leave from {} ignored: not seeking or paired", user);
                return Ok(LeaveOutcome::AlreadyIdle);
            }
            PeerState::Seeking => {
                tracing::debug!("{} stopped seeking", user);
                self.notify(user, self.replies().left()).await;
                LeaveOutcome::StoppedSeeking
            }
            PeerState::Paired => {
                tracing::info!("Session of {} ended (partner {:?})", user, release.partner);
                self.notify(user, self.replies().left()).await;
                if let Some(partner) = release.partner {
                    self.notify(partner, self.replies().partner_left()).await;
                }
                LeaveOutcome::Ended {
                    partner: release.partner,
                }
            }
        };

        RelayMetrics::incr(&self.metrics().teardowns_total);
        Ok(outcome)
    }
}
