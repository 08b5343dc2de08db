//! # duet-core
//!
//! Pure logic for duet (no I/O, instant tests).
//!
//! This crate holds the parts of the pairing system that can be expressed
//! as plain functions over records and messages:
//! - [`transition`] - the per-user lifecycle `Idle -> Seeking -> Paired -> Idle`
//! - [`command`] - mapping raw transport updates to [`Command`]s
//! - [`replies`] - outbound text and keyboards, built from configured [`Keys`]
//!
//! Storage, delivery and concurrency live in `duet-relay`, which calls into
//! these functions while holding the appropriate record locks.
//!
//! [`Command`]: duet_types::Command

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod replies;
pub mod transition;

pub use command::map_update;
pub use replies::{Keys, Replies};
pub use transition::{apply, check_pair, Applied, PeerEvent};
