//! Main PairRelay coordination.
//!
//! PairRelay owns the user directory, the outbound notifier and the reply
//! formatter. The matcher, dispatcher, teardown and façade are implemented
//! as methods on it in their own modules.

use crate::config::Config;
use crate::error::StorageError;
use crate::notifier::Notifier;
use crate::storage::Directory;
use duet_core::Replies;
use duet_types::{Outbound, Profile, UserId, UserRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Inbound updates received from the transport.
    pub updates_total: AtomicU64,
    /// Seek commands handled.
    pub seeks_total: AtomicU64,
    /// Pairings formed.
    pub pairings_total: AtomicU64,
    /// Binds lost to a concurrent matcher.
    pub match_conflicts_total: AtomicU64,
    /// Texts delivered to a partner.
    pub relayed_total: AtomicU64,
    /// Texts dropped because the sender had no valid partner.
    pub relay_dropped_total: AtomicU64,
    /// Sessions or searches ended.
    pub teardowns_total: AtomicU64,
    /// Outbound deliveries the transport rejected.
    pub notify_failures_total: AtomicU64,
    /// Operations failed by the directory.
    pub storage_errors_total: AtomicU64,
}

impl RelayMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Main relay.
pub struct PairRelay {
    config: Config,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
    replies: Replies,
    metrics: RelayMetrics,
}

impl std::fmt::Debug for PairRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairRelay")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl PairRelay {
    /// Create a relay over the given directory and notifier.
    pub fn new(config: Config, directory: Arc<dyn Directory>, notifier: Arc<dyn Notifier>) -> Self {
        let replies = Replies::new(config.keys.clone());
        Self {
            config,
            directory,
            notifier,
            replies,
            metrics: RelayMetrics::default(),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the user directory.
    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    /// Get the reply formatter.
    pub fn replies(&self) -> &Replies {
        &self.replies
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Deliver a message, logging (not propagating) transport failures.
    pub(crate) async fn notify(&self, user: UserId, message: Outbound) {
        if let Err(e) = self.notifier.notify(user, message).await {
            RelayMetrics::incr(&self.metrics.notify_failures_total);
            tracing::warn!("Failed to notify {}: {}", user, e);
        }
    }

    /// Read a user's record, creating a default one on first contact.
    pub(crate) async fn ensure_user(&self, user: UserId) -> Result<UserRecord, StorageError> {
        match self.directory.get(user).await? {
            Some(record) => Ok(record),
            None => {
                tracing::debug!("Creating record for unknown user {}", user);
                self.directory.upsert(user, &Profile::default()).await
            }
        }
    }

    /// Count a directory failure before handing it back to the caller.
    pub(crate) fn storage_failed(&self, error: StorageError) -> StorageError {
        RelayMetrics::incr(&self.metrics.storage_errors_total);
        tracing::error!("Directory operation failed: {}", error);
        error
    }
}
