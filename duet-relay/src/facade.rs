//! Bot façade: inbound updates in, commands dispatched.

use crate::dispatcher::RelayOutcome;
use crate::error::{RelayError, StorageError};
use crate::matcher::SeekOutcome;
use crate::server::{PairRelay, RelayMetrics};
use crate::teardown::LeaveOutcome;
use duet_core::map_update;
use duet_types::{Command, PeerState, Profile, Update, UserId};
use serde::Serialize;

/// What handling an update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "command", content = "result", rename_all = "snake_case")]
pub enum Handled {
    /// The update carried nothing the relay acts on.
    Ignored,
    /// Welcome sent. `ended` is set if a running search or session was
    /// torn down first.
    Start {
        /// Teardown performed before the welcome.
        ended: Option<LeaveOutcome>,
    },
    /// Seek handled.
    Seek(SeekOutcome),
    /// Leave handled.
    Leave(LeaveOutcome),
    /// Text relayed or dropped.
    Text(RelayOutcome),
}

impl PairRelay {
    /// Map a raw transport update to a command and run it.
    pub async fn handle_update(&self, update: &Update) -> Result<Handled, RelayError> {
        RelayMetrics::incr(&self.metrics().updates_total);
        let Some(command) = map_update(update, self.replies().keys()) else {
            tracing::debug!("Ignoring update from {} without text", update.chat_id);
            return Ok(Handled::Ignored);
        };
        self.execute(command).await
    }

    /// Run a single command.
    pub async fn execute(&self, command: Command) -> Result<Handled, RelayError> {
        tracing::debug!("Executing {} for {}", command.kind(), command.user());
        let handled = match command {
            Command::Start {
                user,
                profile,
                reply_to,
            } => self.start(user, &profile, reply_to).await?,
            Command::Seek { user } => Handled::Seek(self.seek(user).await?),
            Command::Leave { user } => Handled::Leave(self.leave(user).await?),
            Command::Text { user, payload } => Handled::Text(self.relay(user, &payload).await?),
        };
        Ok(handled)
    }

    /// Register (or refresh) a user and greet them.
    ///
    /// A user who restarts mid-search or mid-session is taken back to idle
    /// first, so their partner is not left pointing at them.
    pub async fn start(
        &self,
        user: UserId,
        profile: &Profile,
        reply_to: Option<i64>,
    ) -> Result<Handled, StorageError> {
        let record = self
            .directory()
            .upsert(user, profile)
            .await
            .map_err(|e| self.storage_failed(e))?;

        let ended = if record.state == PeerState::Idle {
            None
        } else {
            tracing::info!("{} restarted while {}; leaving first", user, record.state);
            Some(self.leave(user).await?)
        };

        self.notify(user, self.replies().welcome(&record.profile, reply_to))
            .await;
        Ok(Handled::Start { ended })
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

    fn start_update(id: i64, name: &str, message_id: i64) -> Update {
        let mut update = Update::text(uid(id), "/start");
        update.message_id = Some(message_id);
        update.profile = Profile::named(name);
        update
    }

    #[tokio::test]
    async fn start_registers_and_welcomes() {
        let (relay, notifier) = test_relay();
        let handled = relay.handle_update(&start_update(1, "Ada", 17)).await.unwrap();
        assert_eq!(handled, Handled::Start { ended: None });

        let record = relay.directory().get(uid(1)).await.unwrap().unwrap();
        assert_eq!(record.state, PeerState::Idle);
        assert_eq!(record.profile.first_name.as_deref(), Some("Ada"));

        let welcome = notifier.last_for(uid(1)).unwrap();
        assert!(welcome.text.contains("**Ada**"));
        assert_eq!(welcome.reply_to, Some(17));
        assert_eq!(welcome.keyboard, Some(relay.replies().main_keyboard()));
    }

    #[tokio::test]
    async fn button_labels_drive_seek_and_leave() {
        let (relay, _) = test_relay();
        let keys = relay.replies().keys().clone();

        let seek = relay
            .handle_update(&Update::text(uid(1), keys.random_connect.clone()))
            .await
            .unwrap();
        assert_eq!(seek, Handled::Seek(SeekOutcome::Waiting));

        let leave = relay
            .handle_update(&Update::text(uid(1), keys.exit))
            .await
            .unwrap();
        assert_eq!(leave, Handled::Leave(LeaveOutcome::StoppedSeeking));
    }

    #[tokio::test]
    async fn other_text_is_relayed() {
        let (relay, notifier) = test_relay();
        paired(&relay, uid(1), uid(2)).await;

        let handled = relay
            .handle_update(&Update::text(uid(2), "hi there"))
            .await
            .unwrap();
        assert_eq!(handled, Handled::Text(RelayOutcome::Delivered { partner: uid(1) }));
        assert_eq!(notifier.last_for(uid(1)).unwrap().text, "hi there");
    }

    #[tokio::test]
    async fn textless_update_is_ignored() {
        let (relay, notifier) = test_relay();
        let update = Update {
            chat_id: uid(1),
            message_id: Some(1),
            text: None,
            profile: Profile::default(),
        };
        assert_eq!(relay.handle_update(&update).await.unwrap(), Handled::Ignored);
        assert!(notifier.sent().is_empty());
        assert_eq!(relay.metrics().updates_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn restart_mid_session_ends_it() {
        let (relay, notifier) = test_relay();
        paired(&relay, uid(1), uid(2)).await;
        notifier.clear();

        let handled = relay.handle_update(&start_update(1, "Ada", 5)).await.unwrap();
        assert_eq!(
            handled,
            Handled::Start {
                ended: Some(LeaveOutcome::Ended { partner: Some(uid(2)) })
            }
        );
        let two = relay.directory().get(uid(2)).await.unwrap().unwrap();
        assert_eq!(two.state, PeerState::Idle);
        assert_eq!(
            notifier.texts_for(uid(2)),
            vec![relay.replies().partner_left().text]
        );
    }

    #[tokio::test]
    async fn start_merges_profile_without_losing_fields() {
        let (relay, _) = test_relay();
        let mut first = start_update(1, "Ada", 1);
        first.profile.username = Some("ada".into());
        relay.handle_update(&first).await.unwrap();

        relay.handle_update(&start_update(1, "Ada L.", 2)).await.unwrap();
        let record = relay.directory().get(uid(1)).await.unwrap().unwrap();
        assert_eq!(record.profile.first_name.as_deref(), Some("Ada L."));
        assert_eq!(record.profile.username.as_deref(), Some("ada"));
    }

    #[test]
    fn handled_serializes_with_command_tag() {
        let json = serde_json::to_value(Handled::Seek(SeekOutcome::Paired { partner: uid(4) })).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"command": "seek", "result": {"outcome": "paired", "partner": 4}})
        );
        let ignored = serde_json::to_value(Handled::Ignored).unwrap();
        assert_eq!(ignored, serde_json::json!({"command": "ignored"}));
    }
}
