//! Mock notifier for testing.
//!
//! Captures delivered messages for verification and can be told to fail.

use super::Notifier;
use crate::error::NotifyError;
use async_trait::async_trait;
use duet_types::{Outbound, UserId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Mock notifier for testing.
#[derive(Debug, Default, Clone)]
pub struct MockNotifier {
    inner: Arc<Mutex<MockNotifierInner>>,
}

#[derive(Debug, Default)]
struct MockNotifierInner {
    sent: Vec<(UserId, Outbound)>,
    unreachable: HashSet<UserId>,
}

impl MockNotifier {
    /// Create a new mock notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivered message, in delivery order.
    pub fn sent(&self) -> Vec<(UserId, Outbound)> {
        let inner = self.inner.lock().unwrap();
        inner.sent.clone()
    }

    /// Texts delivered to `user`, in delivery order.
    pub fn texts_for(&self, user: UserId) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .sent
            .iter()
            .filter(|(to, _)| *to == user)
            .map(|(_, m)| m.text.clone())
            .collect()
    }

    /// The last message delivered to `user`.
    pub fn last_for(&self, user: UserId) -> Option<Outbound> {
        let inner = self.inner.lock().unwrap();
        inner
            .sent
            .iter()
            .rev()
            .find(|(to, _)| *to == user)
            .map(|(_, m)| m.clone())
    }

    /// Make every delivery to `user` fail.
    pub fn make_unreachable(&self, user: UserId) {
        let mut inner = self.inner.lock().unwrap();
        inner.unreachable.insert(user);
    }

    /// Forget captured messages.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.sent.clear();
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, user: UserId, message: Outbound) -> Result<(), NotifyError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unreachable.contains(&user) {
            return Err(NotifyError::Delivery {
                user,
                reason: "unreachable (mock)".to_string(),
            });
        }
        inner.sent.push((user, message));
        Ok(())
    }
}
