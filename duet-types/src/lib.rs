//! # duet-types
//!
//! Shared types for the duet anonymous pairing relay.
//!
//! This crate provides the foundational types used across all duet crates:
//! - [`UserId`] - Stable participant identity (the transport's chat id)
//! - [`PeerState`], [`UserRecord`], [`Profile`] - Directory records
//! - [`Update`], [`Command`] - Inbound events and the commands they map to
//! - [`Outbound`], [`Keyboard`] - Outbound messages handed to the transport
//! - [`DuetError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
mod record;

pub use error::DuetError;
pub use ids::UserId;
pub use messages::{Command, Keyboard, Outbound, Update};
pub use record::{PeerState, Profile, UserRecord};
