//! Per-user outbound queues drained by the HTTP transport.

use super::Notifier;
use crate::error::NotifyError;
use async_trait::async_trait;
use dashmap::DashMap;
use duet_types::{Outbound, UserId};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// A message waiting to be picked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedMessage {
    /// Unix timestamp when the message was queued.
    pub queued_at: i64,
    /// The message itself.
    #[serde(flatten)]
    pub message: Outbound,
}

/// Bounded per-user message queues.
///
/// When a queue is full the oldest message is dropped.
#[derive(Debug)]
pub struct Outbox {
    queues: DashMap<UserId, VecDeque<QueuedMessage>>,
    max_queued: usize,
}

impl Outbox {
    /// Create an outbox holding at most `max_queued` messages per user.
    pub fn new(max_queued: usize) -> Self {
        Self {
            queues: DashMap::new(),
            max_queued: max_queued.max(1),
        }
    }

    /// Queue a message, stamped with the current time.
    pub fn push(&self, user: UserId, message: Outbound) {
        self.push_at(user, message, current_timestamp());
    }

    fn push_at(&self, user: UserId, message: Outbound, queued_at: i64) {
        let mut queue = self.queues.entry(user).or_default();
        if queue.len() >= self.max_queued {
            queue.pop_front();
            tracing::warn!("Outbox for {} full ({}), dropped oldest message", user, self.max_queued);
        }
        queue.push_back(QueuedMessage { queued_at, message });
    }

    /// Take every queued message for `user`, oldest first.
    pub fn drain(&self, user: UserId) -> Vec<QueuedMessage> {
        self.queues
            .remove(&user)
            .map(|(_, queue)| queue.into_iter().collect())
            .unwrap_or_default()
    }

    /// Messages waiting for `user`.
    pub fn pending(&self, user: UserId) -> usize {
        self.queues.get(&user).map(|q| q.len()).unwrap_or(0)
    }

    /// Messages waiting across all users.
    pub fn total_pending(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    /// Drop messages queued more than `ttl_secs` ago.
    ///
    /// Returns the number of messages dropped.
    pub fn expire_older_than(&self, ttl_secs: u64) -> usize {
        let cutoff = current_timestamp().saturating_sub(ttl_secs as i64);
        let mut dropped = 0;
        self.queues.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|m| m.queued_at > cutoff);
            dropped += before - queue.len();
            !queue.is_empty()
        });
        dropped
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn notify(&self, user: UserId, message: Outbound) -> Result<(), NotifyError> {
        self.push(user, message);
        Ok(())
    }
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
