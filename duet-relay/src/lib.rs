//! # duet-relay
//!
//! Anonymous one-on-one pairing relay.
//!
//! Participants enter a waiting pool, get paired with exactly one other
//! participant, exchange text through the relay, and end the session at
//! will. This crate holds everything with I/O or shared state:
//! - the user directory (in-memory or SQLite)
//! - the matcher, dispatcher and teardown, as methods on [`PairRelay`]
//! - the bot façade mapping transport updates to commands
//! - outbound delivery and the HTTP transport
//!
//! ## Architecture
//!
//! ```text
//! transport ──POST /updates──► façade ──► matcher / dispatcher / teardown
//!                                              │              │
//!                                         Directory       Notifier
//!                                     (memory | SQLite)    (Outbox)
//! transport ◄─GET /users/{id}/messages──────────────────────────┘
//! ```
//!
//! Pairings are symmetric at every observable moment: `a.partner == b` iff
//! `b.partner == a`. The directory enforces this with conditional updates,
//! not with locks held across awaits on other users.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleanup;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod facade;
pub mod http;
pub mod matcher;
pub mod notifier;
pub mod server;
pub mod storage;
pub mod teardown;

pub use dispatcher::{DropReason, RelayOutcome};
pub use error::{RelayError, StorageError};
pub use facade::Handled;
pub use matcher::SeekOutcome;
pub use server::PairRelay;
pub use teardown::LeaveOutcome;
