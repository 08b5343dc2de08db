//! In-memory directory backend.
//!
//! Each record sits behind its own async mutex; there is no lock over the
//! whole directory. Operations that touch a pair lock both records in
//! ascending id order, so two concurrent pair operations cannot deadlock.

use super::{Directory, Release, StateCounts};
use crate::error::StorageError;
use async_trait::async_trait;
use dashmap::DashMap;
use duet_core::{apply, Applied, PeerEvent};
use duet_types::{PeerState, Profile, UserId, UserRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<UserRecord>>;

/// Rescans tolerated when the waiting-pool index races a writer.
const MAX_SCAN_RETRIES: usize = 8;

/// Optimistic retries for `release` when the partner changes under us.
const MAX_RELEASE_RETRIES: usize = 8;

/// Process-local user directory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    records: DashMap<UserId, Slot>,
    /// Waiting pool: seeker -> FIFO ticket. Only written while holding the
    /// seeker's record lock.
    seekers: DashMap<UserId, u64>,
    next_ticket: AtomicU64,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: UserId) -> Option<Slot> {
        self.records.get(&id).map(|entry| entry.value().clone())
    }

    fn ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::Relaxed)
    }

    /// Write `state` into a locked record, keeping the waiting pool in sync.
    fn write_state(&self, record: &mut UserRecord, state: PeerState) {
        if state == PeerState::Seeking {
            if record.seeking_since.is_none() {
                record.seeking_since = Some(self.ticket());
            }
        } else {
            record.seeking_since = None;
        }
        record.state = state;
        self.sync_pool(record);
    }

    fn sync_pool(&self, record: &UserRecord) {
        match (record.state, record.seeking_since) {
            (PeerState::Seeking, Some(ticket)) => {
                self.seekers.insert(record.id, ticket);
            }
            _ => {
                self.seekers.remove(&record.id);
            }
        }
    }

    /// Lock two distinct records in id order; guards are returned as (a, b).
    async fn lock_pair(
        a: Slot,
        b: Slot,
        a_id: UserId,
        b_id: UserId,
    ) -> (OwnedMutexGuard<UserRecord>, OwnedMutexGuard<UserRecord>) {
        if a_id < b_id {
            let ga = a.lock_owned().await;
            let gb = b.lock_owned().await;
            (ga, gb)
        } else {
            let gb = b.lock_owned().await;
            let ga = a.lock_owned().await;
            (ga, gb)
        }
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn upsert(&self, id: UserId, profile: &Profile) -> Result<UserRecord, StorageError> {
        let slot = self
            .records
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(UserRecord::new(id, Profile::default()))))
            .value()
            .clone();

        let mut record = slot.lock().await;
        record.profile.merge(profile);
        Ok(record.clone())
    }

    async fn get(&self, id: UserId) -> Result<Option<UserRecord>, StorageError> {
        let Some(slot) = self.slot(id) else {
            return Ok(None);
        };
        let record = slot.lock().await.clone();
        Ok(Some(record))
    }

    async fn set_state(&self, id: UserId, state: PeerState) -> Result<(), StorageError> {
        let slot = self.slot(id).ok_or(StorageError::NotFound { user: id })?;
        let mut record = slot.lock().await;
        self.write_state(&mut record, state);
        Ok(())
    }

    async fn set_partner(&self, id: UserId, partner: Option<UserId>) -> Result<(), StorageError> {
        if partner == Some(id) {
            return Err(StorageError::InvalidRecord(format!("{id} cannot partner itself")));
        }
        let slot = self.slot(id).ok_or(StorageError::NotFound { user: id })?;
        slot.lock().await.partner_id = partner;
        Ok(())
    }

    async fn compare_and_set_state(
        &self,
        id: UserId,
        expected: PeerState,
        new: PeerState,
    ) -> Result<bool, StorageError> {
        let Some(slot) = self.slot(id) else {
            return Ok(false);
        };
        let mut record = slot.lock().await;
        if record.state != expected {
            return Ok(false);
        }
        if new != PeerState::Seeking {
            self.write_state(&mut record, new);
            return Ok(true);
        }

        // Entering the pool is a lifecycle edge: only Idle takes a ticket,
        // an existing seeker keeps theirs, and a paired user is refused.
        match apply(&mut record, PeerEvent::Seek { ticket: self.ticket() }) {
            Ok(_) => {
                self.sync_pool(&record);
                Ok(true)
            }
            Err(e) => {
                tracing::debug!("Refused to move {} into the pool: {}", id, e);
                Ok(false)
            }
        }
    }

    async fn find_one_seeking_excluding(
        &self,
        excluded: UserId,
    ) -> Result<Option<UserRecord>, StorageError> {
        for _ in 0..MAX_SCAN_RETRIES {
            let head = self
                .seekers
                .iter()
                .filter(|entry| *entry.key() != excluded)
                .map(|entry| (*entry.value(), *entry.key()))
                .min();

            let Some((_, id)) = head else {
                return Ok(None);
            };
            let Some(slot) = self.slot(id) else {
                continue;
            };
            let record = slot.lock().await;
            if record.state == PeerState::Seeking {
                return Ok(Some(record.clone()));
            }
            // Claimed between the index scan and the lock; look again.
        }
        tracing::debug!("Waiting pool kept changing during scan; reporting no candidate");
        Ok(None)
    }

    async fn bind_pair(&self, requester: UserId, candidate: UserId) -> Result<bool, StorageError> {
        if requester == candidate {
            return Ok(false);
        }
        let (Some(a), Some(b)) = (self.slot(requester), self.slot(candidate)) else {
            return Ok(false);
        };
        let (mut ga, mut gb) = Self::lock_pair(a, b, requester, candidate).await;

        // Work on copies so a refused transition leaves both records untouched.
        let mut next_a = (*ga).clone();
        let mut next_b = (*gb).clone();
        let bound = matches!(
            (
                apply(&mut next_a, PeerEvent::Matched { partner: candidate }),
                apply(&mut next_b, PeerEvent::Matched { partner: requester }),
            ),
            (Ok(Applied::Changed { .. }), Ok(Applied::Changed { .. }))
        );
        if !bound {
            return Ok(false);
        }

        *ga = next_a;
        *gb = next_b;
        self.sync_pool(&ga);
        self.sync_pool(&gb);
        Ok(true)
    }

    async fn release(&self, id: UserId) -> Result<Release, StorageError> {
        for _ in 0..MAX_RELEASE_RETRIES {
            let Some(slot) = self.slot(id) else {
                return Ok(Release::idle());
            };

            let partner = {
                let mut record = slot.lock().await;
                match record.state {
                    PeerState::Idle => return Ok(Release::idle()),
                    PeerState::Seeking => {
                        apply(&mut record, PeerEvent::Leave)
                            .map_err(|e| StorageError::InvalidRecord(e.to_string()))?;
                        self.sync_pool(&record);
                        return Ok(Release {
                            previous: PeerState::Seeking,
                            partner: None,
                        });
                    }
                    PeerState::Paired => record.partner_id,
                }
            };

            let Some(partner_id) = partner else {
                // Paired without a partner cannot be produced by bind_pair;
                // reset the record rather than leave it stuck.
                let mut record = slot.lock().await;
                tracing::warn!("User {} was paired without a partner; resetting", id);
                self.write_state(&mut record, PeerState::Idle);
                record.partner_id = None;
                return Ok(Release {
                    previous: PeerState::Paired,
                    partner: None,
                });
            };

            let Some(partner_slot) = self.slot(partner_id) else {
                let mut record = slot.lock().await;
                if !record.is_paired_with(partner_id) {
                    continue;
                }
                tracing::warn!("Partner {} of {} has no record; resetting one side", partner_id, id);
                self.write_state(&mut record, PeerState::Idle);
                record.partner_id = None;
                return Ok(Release {
                    previous: PeerState::Paired,
                    partner: None,
                });
            };

            let (mut user, mut other) = Self::lock_pair(slot, partner_slot, id, partner_id).await;
            if !user.is_paired_with(partner_id) {
                // Released or re-paired while we were unlocked.
                continue;
            }

            apply(&mut user, PeerEvent::Leave)
                .map_err(|e| StorageError::InvalidRecord(e.to_string()))?;
            self.sync_pool(&user);

            let partner_reset = if other.is_paired_with(id) {
                apply(&mut other, PeerEvent::Leave)
                    .map_err(|e| StorageError::InvalidRecord(e.to_string()))?;
                self.sync_pool(&other);
                Some(partner_id)
            } else {
                tracing::warn!("Partner {} did not point back at {}", partner_id, id);
                None
            };

            return Ok(Release {
                previous: PeerState::Paired,
                partner: partner_reset,
            });
        }
        Err(StorageError::Contended { user: id })
    }

    async fn count_by_state(&self) -> Result<StateCounts, StorageError> {
        let slots: Vec<Slot> = self.records.iter().map(|e| e.value().clone()).collect();
        let mut counts = StateCounts::default();
        for slot in slots {
            counts.add(slot.lock().await.state, 1);
        }
        Ok(counts)
    }
}
