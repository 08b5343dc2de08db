//! Mapping raw transport updates to commands.

use duet_types::{Command, Update};

use crate::Keys;

/// Transport command that (re)starts a conversation with the bot.
const START: &str = "/start";

/// Map an inbound update to the command it represents.
///
/// Returns `None` for updates without text (media, service events): media
/// relay is not supported, so these never reach the core.
pub fn map_update(update: &Update, keys: &Keys) -> Option<Command> {
    let text = update.text.as_deref()?;
    if text.is_empty() {
        return None;
    }
    let user = update.chat_id;

    let command = if is_start(text) {
        Command::Start {
            user,
            profile: update.profile.clone(),
            reply_to: update.message_id,
        }
    } else if text == keys.random_connect {
        Command::Seek { user }
    } else if text == keys.exit {
        Command::Leave { user }
    } else {
        Command::Text {
            user,
            payload: text.to_string(),
        }
    };
    Some(command)
}

fn is_start(text: &str) -> bool {
    let head = text.split_whitespace().next().unwrap_or_default();
    // Group clients append the bot name: `/start@duet_bot`.
    head == START || head.split('@').next() == Some(START)
}
