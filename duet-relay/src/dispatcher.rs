//! Message dispatcher.
//!
//! Forwards a paired user's text to their partner, verbatim. Relaying reads
//! the directory and never writes it, so it runs alongside any number of
//! seeks and leaves without coordination.

use crate::error::StorageError;
use crate::server::{PairRelay, RelayMetrics};
use duet_types::{PeerState, UserId};
use serde::Serialize;

/// Why a text was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The sender has no record.
    UnknownSender,
    /// The sender is idle or still searching.
    NotPaired,
    /// The sender is paired but has no partner set.
    NoPartner,
    /// The partner no longer points back at the sender.
    StalePartner,
}

/// Result of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RelayOutcome {
    /// Handed to the notifier for `partner`.
    Delivered {
        /// Recipient.
        partner: UserId,
    },
    /// Silently dropped.
    Dropped {
        /// Why.
        reason: DropReason,
    },
}

impl PairRelay {
    /// Forward `text` from `sender` to their current partner.
    ///
    /// Texts from users without a valid partner are dropped without any
    /// notification to anyone.
    pub async fn relay(&self, sender: UserId, text: &str) -> Result<RelayOutcome, StorageError> {
        let outcome = self
            .resolve_partner(sender)
            .await
            .map_err(|e| self.storage_failed(e))?;

        match outcome {
            RelayOutcome::Delivered { partner } => {
                RelayMetrics::incr(&self.metrics().relayed_total);
                tracing::debug!("Relaying {} bytes from {} to {}", text.len(), sender, partner);
                self.notify(partner, self.replies().relayed(text)).await;
            }
            RelayOutcome::Dropped { reason } => {
                RelayMetrics::incr(&self.metrics().relay_dropped_total);
                tracing::debug!("Dropped text from {}: {:?}", sender, reason);
            }
        }
        Ok(outcome)
    }

    async fn resolve_partner(&self, sender: UserId) -> Result<RelayOutcome, StorageError> {
        let dropped = |reason| Ok(RelayOutcome::Dropped { reason });

        let Some(record) = self.directory().get(sender).await? else {
            return dropped(DropReason::UnknownSender);
        };
        if record.state != PeerState::Paired {
            return dropped(DropReason::NotPaired);
        }
        let Some(partner) = record.partner_id else {
            return dropped(DropReason::NoPartner);
        };

        // A partner that already left (or re-paired) must not receive it.
        match self.directory().get(partner).await? {
            Some(other) if other.is_paired_with(sender) => Ok(RelayOutcome::Delivered { partner }),
            _ => dropped(DropReason::StalePartner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::{paired, test_relay};
    use std::sync::atomic::Ordering;

    fn uid(n: i64) -> UserId {
        UserId::new(n)
    }

    #[tokio::test]
    async fn paired_text_reaches_partner_verbatim() {
        let (relay, notifier) = test_relay();
        paired(&relay, uid(1), uid(2)).await;
        notifier.clear();

        let outcome = relay.relay(uid(1), "hello  *there*").await.unwrap();
        assert_eq!(outcome, RelayOutcome::Delivered { partner: uid(2) });
        assert_eq!(notifier.texts_for(uid(2)), vec!["hello  *there*"]);
        assert!(notifier.texts_for(uid(1)).is_empty());
        assert_eq!(relay.metrics().relayed_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn unknown_sender_is_dropped() {
        let (relay, notifier) = test_relay();
        let outcome = relay.relay(uid(9), "hi").await.unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::Dropped {
                reason: DropReason::UnknownSender
            }
        );
        assert!(notifier.sent().is_empty());
        // Relaying never creates records.
        assert!(relay.directory().get(uid(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn idle_and_seeking_senders_are_dropped() {
        let (relay, notifier) = test_relay();
        relay.ensure_user(uid(1)).await.unwrap();
        relay.seek(uid(2)).await.unwrap();
        notifier.clear();

        for sender in [uid(1), uid(2)] {
            assert_eq!(
                relay.relay(sender, "hi").await.unwrap(),
                RelayOutcome::Dropped {
                    reason: DropReason::NotPaired
                }
            );
        }
        assert!(notifier.sent().is_empty());
        assert_eq!(relay.metrics().relay_dropped_total.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn stale_partner_is_not_delivered() {
        let (relay, notifier) = test_relay();
        let dir = relay.directory();
        // Hand-build a one-sided pairing: 1 points at 2, 2 is idle.
        relay.ensure_user(uid(1)).await.unwrap();
        relay.ensure_user(uid(2)).await.unwrap();
        dir.set_state(uid(1), PeerState::Paired).await.unwrap();
        dir.set_partner(uid(1), Some(uid(2))).await.unwrap();

        assert_eq!(
            relay.relay(uid(1), "anyone?").await.unwrap(),
            RelayOutcome::Dropped {
                reason: DropReason::StalePartner
            }
        );
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn paired_without_partner_is_dropped() {
        let (relay, _) = test_relay();
        relay.ensure_user(uid(1)).await.unwrap();
        relay
            .directory()
            .set_state(uid(1), PeerState::Paired)
            .await
            .unwrap();

        assert_eq!(
            relay.relay(uid(1), "hi").await.unwrap(),
            RelayOutcome::Dropped {
                reason: DropReason::NoPartner
            }
        );
    }

    #[tokio::test]
    async fn relay_does_not_change_records() {
        let (relay, _) = test_relay();
        paired(&relay, uid(1), uid(2)).await;
        let before = relay.directory().get(uid(1)).await.unwrap();
        relay.relay(uid(1), "hi").await.unwrap();
        relay.relay(uid(2), "back").await.unwrap();
        assert_eq!(relay.directory().get(uid(1)).await.unwrap(), before);
    }
}
