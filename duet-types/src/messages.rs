//! Inbound events, commands, and outbound messages.

use serde::{Deserialize, Serialize};

use crate::{Profile, UserId};

/// A raw inbound event as delivered by the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Chat the event came from; identifies the participant.
    pub chat_id: UserId,
    /// Transport message id, used to thread replies.
    #[serde(default)]
    pub message_id: Option<i64>,
    /// Text content. Absent for media and service events.
    #[serde(default)]
    pub text: Option<String>,
    /// Sender display metadata.
    #[serde(default)]
    pub profile: Profile,
}

impl Update {
    /// Build a text update (mostly for tests and tooling).
    pub fn text(chat_id: UserId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            message_id: None,
            text: Some(text.into()),
            profile: Profile::default(),
        }
    }
}

/// The logical commands the pairing core understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// First contact or explicit restart.
    Start {
        /// Participant.
        user: UserId,
        /// Profile delta to upsert.
        profile: Profile,
        /// Message to reply to.
        reply_to: Option<i64>,
    },
    /// Enter the waiting pool and try to find a partner.
    Seek {
        /// Participant.
        user: UserId,
    },
    /// End the current session or cancel a pending search.
    Leave {
        /// Participant.
        user: UserId,
    },
    /// Relay text to the current partner.
    Text {
        /// Sender.
        user: UserId,
        /// Payload, forwarded verbatim.
        payload: String,
    },
}

impl Command {
    /// The participant this command is about.
    pub fn user(&self) -> UserId {
        match self {
            Self::Start { user, .. }
            | Self::Seek { user }
            | Self::Leave { user }
            | Self::Text { user, .. } => *user,
        }
    }

    /// Short name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Seek { .. } => "seek",
            Self::Leave { .. } => "leave",
            Self::Text { .. } => "text",
        }
    }
}

/// A reply keyboard shown under the transport's input box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    /// Button rows, top to bottom.
    pub rows: Vec<Vec<String>>,
}

impl Keyboard {
    /// A keyboard with one button per row.
    pub fn single_column<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: labels.into_iter().map(|l| vec![l.into()]).collect(),
        }
    }
}

/// A message the core hands to the transport for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    /// Text body.
    pub text: String,
    /// Keyboard to show with the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Keyboard>,
    /// Transport message id this replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<i64>,
}

impl Outbound {
    /// A bare text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            reply_to: None,
        }
    }

    /// Attach a keyboard.
    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    /// Thread this message as a reply.
    pub fn replying_to(mut self, message_id: Option<i64>) -> Self {
        self.reply_to = message_id;
        self
    }
}
