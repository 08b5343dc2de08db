//! Session matcher.
//!
//! Moves a requester into the waiting pool and tries to bind them to the
//! longest-waiting other seeker. Binding is a conditional update in the
//! directory: two requesters that pick each other (or the same candidate)
//! at the same moment cannot both win. The loser searches again, a bounded
//! number of times, and otherwise stays in the pool. Nothing here waits on
//! another user; a seeker is found later by someone else's search.

use crate::error::StorageError;
use crate::server::{PairRelay, RelayMetrics};
use duet_types::{PeerState, UserId};
use serde::Serialize;

/// Result of a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SeekOutcome {
    /// In the pool; no partner yet.
    Waiting,
    /// Bound to `partner`, by this seek or a concurrent one.
    Paired {
        /// The counterpart.
        partner: UserId,
    },
    /// Already in a session; nothing changed.
    AlreadyPaired,
    /// The requester left while the search was running.
    Cancelled,
}

impl PairRelay {
    /// Enter the waiting pool and try to pair `user`.
    pub async fn seek(&self, user: UserId) -> Result<SeekOutcome, StorageError> {
        RelayMetrics::incr(&self.metrics().seeks_total);
        self.seek_inner(user).await.map_err(|e| self.storage_failed(e))
    }

    async fn seek_inner(&self, user: UserId) -> Result<SeekOutcome, StorageError> {
        if !self.enter_pool(user).await? {
            tracing::debug!("Seek from {} ignored: already paired", user);
            self.notify(user, self.replies().already_paired()).await;
            return Ok(SeekOutcome::AlreadyPaired);
        }
        // A concurrent matcher may have claimed us already; it sent
        // "connected", so "searching" would arrive out of order.
        if let Some(outcome) = self.settled(user).await? {
            return Ok(outcome);
        }
        self.notify(user, self.replies().searching()).await;

        let attempts = self.config().matching.max_attempts.max(1);
        for attempt in 1..=attempts {
            let Some(candidate) = self.directory().find_one_seeking_excluding(user).await? else {
                if let Some(outcome) = self.settled(user).await? {
                    return Ok(outcome);
                }
                tracing::debug!("No candidate for {}; waiting", user);
                return Ok(SeekOutcome::Waiting);
            };

            if self.directory().bind_pair(user, candidate.id).await? {
                RelayMetrics::incr(&self.metrics().pairings_total);
                tracing::info!("Paired {} with {}", user, candidate.id);
                self.notify(candidate.id, self.replies().connected(user)).await;
                self.notify(user, self.replies().connected(candidate.id)).await;
                return Ok(SeekOutcome::Paired {
                    partner: candidate.id,
                });
            }

            RelayMetrics::incr(&self.metrics().match_conflicts_total);
            tracing::warn!(
                "Match conflict for {} on candidate {} (attempt {}/{})",
                user,
                candidate.id,
                attempt,
                attempts
            );

            // The bind also fails when the requester itself was claimed or
            // left in the meantime.
            if let Some(outcome) = self.settled(user).await? {
                return Ok(outcome);
            }
        }

        tracing::debug!("{} still waiting after {} contested attempts", user, attempts);
        Ok(SeekOutcome::Waiting)
    }

    /// Where `user` stands if they are no longer in the pool.
    ///
    /// `None` while still seeking.
    async fn settled(&self, user: UserId) -> Result<Option<SeekOutcome>, StorageError> {
        let outcome = match self.directory().get(user).await? {
            Some(record) => match (record.state, record.partner_id) {
                (PeerState::Seeking, _) => None,
                (PeerState::Paired, Some(partner)) => Some(SeekOutcome::Paired { partner }),
                (PeerState::Paired, None) => None,
                (PeerState::Idle, _) => Some(SeekOutcome::Cancelled),
            },
            None => Some(SeekOutcome::Cancelled),
        };
        Ok(outcome)
    }

    /// Put `user` in the pool. False if they are already paired.
    async fn enter_pool(&self, user: UserId) -> Result<bool, StorageError> {
        // One retry covers a concurrent leave between the read and the CAS.
        for _ in 0..2 {
            let record = self.ensure_user(user).await?;
            match record.state {
                PeerState::Seeking => return Ok(true),
                PeerState::Paired => return Ok(false),
                PeerState::Idle => {
                    if self
                        .directory()
                        .compare_and_set_state(user, PeerState::Idle, PeerState::Seeking)
                        .await?
                    {
                        tracing::debug!("{} entered the waiting pool", user);
                        return Ok(true);
                    }
                }
            }
        }
        Err(StorageError::Contended { user })
    }
}
