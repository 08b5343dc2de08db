//! Outbound delivery.
//!
//! The relay hands every outbound message to a [`Notifier`]. Delivery is
//! fire-and-forget from the core's point of view: failures are logged and
//! counted by the caller, never turned into operation errors.

mod mock;
mod outbox;

pub use mock::MockNotifier;
pub use outbox::{Outbox, QueuedMessage};

use crate::error::NotifyError;
use async_trait::async_trait;
use duet_types::{Outbound, UserId};

/// Trait for outbound transports.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message` to `user`.
    async fn notify(&self, user: UserId, message: Outbound) -> Result<(), NotifyError>;
}
