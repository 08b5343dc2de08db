//! User directory for duet-relay.
//!
//! One record per participant, keyed by [`UserId`]. The plain point updates
//! (`set_state`, `set_partner`) exist for tooling and tests; the matcher and
//! teardown only go through the conditional operations (`compare_and_set_state`,
//! `bind_pair`, `release`), which keep pairings symmetric under concurrency.

mod memory;
mod sqlite;

pub use memory::MemoryDirectory;
pub use sqlite::SqliteDirectory;

use crate::error::StorageError;
use async_trait::async_trait;
use duet_types::{PeerState, Profile, UserId, UserRecord};
use serde::Serialize;

/// What `release` found and undid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    /// State the user was in before the release.
    pub previous: PeerState,
    /// Partner that was reset alongside the user, if any.
    pub partner: Option<UserId>,
}

impl Release {
    /// Nothing to undo.
    pub fn idle() -> Self {
        Self {
            previous: PeerState::Idle,
            partner: None,
        }
    }
}

/// Number of records in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    /// Idle users.
    pub idle: u64,
    /// Users in the waiting pool.
    pub seeking: u64,
    /// Users in a session (always even).
    pub paired: u64,
}

impl StateCounts {
    /// Count one more record in `state`.
    pub fn add(&mut self, state: PeerState, n: u64) {
        match state {
            PeerState::Idle => self.idle += n,
            PeerState::Seeking => self.seeking += n,
            PeerState::Paired => self.paired += n,
        }
    }

    /// Total records.
    pub fn total(&self) -> u64 {
        self.idle + self.seeking + self.paired
    }
}

/// Trait for user directory backends.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Create the record on first contact (Idle) or merge the profile delta
    /// into the existing one. Never changes state or partner.
    ///
    /// Returns the record after the write.
    async fn upsert(&self, id: UserId, profile: &Profile) -> Result<UserRecord, StorageError>;

    /// Point read. `None` if the user has never been seen.
    async fn get(&self, id: UserId) -> Result<Option<UserRecord>, StorageError>;

    /// Unconditionally set a user's state.
    ///
    /// Entering `Seeking` takes a FIFO ticket; any other state drops it.
    /// Does not touch `partner_id`.
    async fn set_state(&self, id: UserId, state: PeerState) -> Result<(), StorageError>;

    /// Unconditionally set a user's partner.
    async fn set_partner(&self, id: UserId, partner: Option<UserId>) -> Result<(), StorageError>;

    /// Set `new` only if the stored state still equals `expected`.
    ///
    /// Same ticket rules as [`Directory::set_state`]. Returns false if the
    /// state differed, the user does not exist, or the move would put a
    /// paired user back into the pool.
    async fn compare_and_set_state(
        &self,
        id: UserId,
        expected: PeerState,
        new: PeerState,
    ) -> Result<bool, StorageError>;

    /// The longest-waiting seeker other than `excluded`.
    ///
    /// Ordered by FIFO ticket, ties broken by id.
    async fn find_one_seeking_excluding(
        &self,
        excluded: UserId,
    ) -> Result<Option<UserRecord>, StorageError>;

    /// Atomically pair two seekers.
    ///
    /// Succeeds only if both are distinct and both are still `Seeking`; then
    /// both become `Paired` pointing at each other. On false nothing changed.
    async fn bind_pair(&self, requester: UserId, candidate: UserId) -> Result<bool, StorageError>;

    /// Atomically return a user (and a paired partner) to `Idle`.
    ///
    /// Unknown and already-idle users release as [`Release::idle`].
    async fn release(&self, id: UserId) -> Result<Release, StorageError>;

    /// Records per state.
    async fn count_by_state(&self) -> Result<StateCounts, StorageError>;
}
