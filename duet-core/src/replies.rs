//! Outbound message formatting.
//!
//! Button labels are configuration, passed in at construction. The command
//! mapper compares incoming text against the same labels, so a relabelled
//! keyboard keeps working.

use duet_types::{Keyboard, Outbound, Profile, UserId};
use serde::Deserialize;

/// Reply-keyboard button labels.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Keys {
    /// Enter the waiting pool.
    #[serde(default = "default_random_connect")]
    pub random_connect: String,
    /// Leave the session or cancel the search.
    #[serde(default = "default_exit")]
    pub exit: String,
}

fn default_random_connect() -> String {
    "\u{1F464} Random Connect".to_string()
}

fn default_exit() -> String {
    "\u{274C} Exit".to_string()
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            random_connect: default_random_connect(),
            exit: default_exit(),
        }
    }
}

/// Builds every message the relay sends.
#[derive(Debug, Clone, Default)]
pub struct Replies {
    keys: Keys,
}

impl Replies {
    /// Create a formatter for the given labels.
    pub fn new(keys: Keys) -> Self {
        Self { keys }
    }

    /// The configured labels.
    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    /// Keyboard shown while idle.
    pub fn main_keyboard(&self) -> Keyboard {
        Keyboard::single_column([self.keys.random_connect.as_str()])
    }

    /// Keyboard shown while seeking or paired.
    pub fn exit_keyboard(&self) -> Keyboard {
        Keyboard::single_column([self.keys.exit.as_str()])
    }

    /// Greeting sent in response to `/start`.
    pub fn welcome(&self, profile: &Profile, reply_to: Option<i64>) -> Outbound {
        let name = profile.display_name().unwrap_or("stranger");
        Outbound::text(format!("Hey, **{name}**! Welcome to duet."))
            .with_keyboard(self.main_keyboard())
            .replying_to(reply_to)
    }

    /// Sent when the user enters the waiting pool.
    pub fn searching(&self) -> Outbound {
        Outbound::text("\u{1F465} Connecting to a random stranger....")
            .with_keyboard(self.exit_keyboard())
    }

    /// Sent to each side of a fresh pairing, naming the other side.
    pub fn connected(&self, counterpart: UserId) -> Outbound {
        Outbound::text(format!("Connected to {counterpart} ....")).with_keyboard(self.exit_keyboard())
    }

    /// Sent to a user who asked to seek while already in a session.
    pub fn already_paired(&self) -> Outbound {
        Outbound::text(format!(
            "You are already chatting. Press {} to end this session first.",
            self.keys.exit
        ))
        .with_keyboard(self.exit_keyboard())
    }

    /// Sent to the user who left (or cancelled the search).
    pub fn left(&self) -> Outbound {
        Outbound::text(self.keys.exit.clone()).with_keyboard(self.main_keyboard())
    }

    /// Sent to the partner of a user who left.
    pub fn partner_left(&self) -> Outbound {
        Outbound::text(format!("{} Your partner left the chat.", self.keys.exit))
            .with_keyboard(self.main_keyboard())
    }

    /// Relayed text. Forwarded verbatim, no keyboard change.
    pub fn relayed(&self, text: &str) -> Outbound {
        Outbound::text(text)
    }
}
