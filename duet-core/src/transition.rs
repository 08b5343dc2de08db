//! Per-user lifecycle transitions.
//!
//! The lifecycle is `Idle --seek--> Seeking --matched--> Paired --leave--> Idle`,
//! plus `Seeking --leave--> Idle`. Nothing else is a transition. Seeking again
//! while already seeking and leaving while idle are accepted as no-ops so that
//! repeated user actions never surface as errors.
//!
//! [`apply`] mutates a single record. Pairing two records is the caller's
//! job: it must hold both records and apply [`PeerEvent::Matched`] to each,
//! writing back only if both succeed.

use duet_types::{DuetError, PeerState, UserId, UserRecord};

/// Something that happens to one user's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    /// The user asked to be matched. `ticket` orders the waiting pool.
    Seek {
        /// FIFO ticket, only consumed when entering `Seeking` from `Idle`.
        ticket: u64,
    },
    /// The user was bound to `partner`.
    Matched {
        /// The counterpart.
        partner: UserId,
    },
    /// The user left, or their partner left.
    Leave,
}

impl PeerEvent {
    fn action(&self) -> &'static str {
        match self {
            Self::Seek { .. } => "seek",
            Self::Matched { .. } => "match",
            Self::Leave => "leave",
        }
    }
}

/// Result of applying an event to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The record moved between states.
    Changed {
        /// State before.
        from: PeerState,
        /// State after.
        to: PeerState,
        /// Partner the record pointed at before the change.
        previous_partner: Option<UserId>,
    },
    /// The event was a defined no-op for the current state.
    Unchanged,
}

/// Apply `event` to `record` in place.
///
/// On error the record is left untouched.
pub fn apply(record: &mut UserRecord, event: PeerEvent) -> Result<Applied, DuetError> {
    let from = record.state;
    let previous_partner = record.partner_id;

    match (from, event) {
        (PeerState::Idle, PeerEvent::Seek { ticket }) => {
            record.state = PeerState::Seeking;
            record.partner_id = None;
            record.seeking_since = Some(ticket);
        }
        (PeerState::Seeking, PeerEvent::Seek { .. }) => return Ok(Applied::Unchanged),

        (PeerState::Seeking, PeerEvent::Matched { partner }) => {
            if partner == record.id {
                return Err(DuetError::InvariantViolated(format!(
                    "{} cannot be matched with itself",
                    record.id
                )));
            }
            record.state = PeerState::Paired;
            record.partner_id = Some(partner);
            record.seeking_since = None;
        }

        (PeerState::Idle, PeerEvent::Leave) => return Ok(Applied::Unchanged),
        (PeerState::Seeking | PeerState::Paired, PeerEvent::Leave) => {
            record.state = PeerState::Idle;
            record.partner_id = None;
            record.seeking_since = None;
        }

        (from, event) => {
            return Err(DuetError::InvalidTransition {
                user: record.id,
                from,
                action: event.action(),
            })
        }
    }

    Ok(Applied::Changed {
        from,
        to: record.state,
        previous_partner,
    })
}

/// Check that two records form a consistent, mutual pairing.
pub fn check_pair(a: &UserRecord, b: &UserRecord) -> Result<(), DuetError> {
    a.check_local_invariants()?;
    b.check_local_invariants()?;
    if a.is_paired_with(b.id) && b.is_paired_with(a.id) {
        Ok(())
    } else {
        Err(DuetError::InvariantViolated(format!(
            "{} ({}, partner {:?}) and {} ({}, partner {:?}) are not mutually paired",
            a.id, a.state, a.partner_id, b.id, b.state, b.partner_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_types::Profile;

    fn record(id: i64) -> UserRecord {
        UserRecord::new(UserId::new(id), Profile::default())
    }

    #[test]
    fn idle_seek_enters_pool() {
        let mut r = record(1);
        let applied = apply(&mut r, PeerEvent::Seek { ticket: 7 }).unwrap();
        assert_eq!(
            applied,
            Applied::Changed {
                from: PeerState::Idle,
                to: PeerState::Seeking,
                previous_partner: None,
            }
        );
        assert_eq!(r.seeking_since, Some(7));
    }

    #[test]
    fn seeking_again_keeps_original_ticket() {
        let mut r = record(1);
        apply(&mut r, PeerEvent::Seek { ticket: 7 }).unwrap();
        let applied = apply(&mut r, PeerEvent::Seek { ticket: 9 }).unwrap();
        assert_eq!(applied, Applied::Unchanged);
        assert_eq!(r.seeking_since, Some(7));
    }

    #[test]
    fn paired_cannot_seek() {
        let mut r = record(1);
        apply(&mut r, PeerEvent::Seek { ticket: 1 }).unwrap();
        apply(&mut r, PeerEvent::Matched { partner: UserId::new(2) }).unwrap();
        let before = r.clone();
        assert!(apply(&mut r, PeerEvent::Seek { ticket: 2 }).is_err());
        assert_eq!(r, before);
    }

    #[test]
    fn idle_cannot_be_matched() {
        let mut r = record(1);
        let err = apply(&mut r, PeerEvent::Matched { partner: UserId::new(2) }).unwrap_err();
        assert!(matches!(err, DuetError::InvalidTransition { .. }));
        assert_eq!(r.state, PeerState::Idle);
    }

    #[test]
    fn self_match_is_rejected() {
        let mut r = record(1);
        apply(&mut r, PeerEvent::Seek { ticket: 1 }).unwrap();
        assert!(apply(&mut r, PeerEvent::Matched { partner: UserId::new(1) }).is_err());
        assert_eq!(r.state, PeerState::Seeking);
    }

    #[test]
    fn leave_from_paired_reports_partner() {
        let mut r = record(1);
        apply(&mut r, PeerEvent::Seek { ticket: 1 }).unwrap();
        apply(&mut r, PeerEvent::Matched { partner: UserId::new(2) }).unwrap();
        let applied = apply(&mut r, PeerEvent::Leave).unwrap();
        assert_eq!(
            applied,
            Applied::Changed {
                from: PeerState::Paired,
                to: PeerState::Idle,
                previous_partner: Some(UserId::new(2)),
            }
        );
        assert!(r.partner_id.is_none());
        assert!(r.seeking_since.is_none());
    }

    #[test]
    fn leave_is_idempotent() {
        let mut r = record(1);
        apply(&mut r, PeerEvent::Seek { ticket: 1 }).unwrap();
        apply(&mut r, PeerEvent::Leave).unwrap();
        let once = r.clone();
        assert_eq!(apply(&mut r, PeerEvent::Leave).unwrap(), Applied::Unchanged);
        assert_eq!(r, once);
    }

    #[test]
    fn check_pair_accepts_mutual_binding() {
        let mut a = record(1);
        let mut b = record(2);
        for (r, p) in [(&mut a, 2), (&mut b, 1)] {
            apply(r, PeerEvent::Seek { ticket: 1 }).unwrap();
            apply(r, PeerEvent::Matched { partner: UserId::new(p) }).unwrap();
        }
        assert!(check_pair(&a, &b).is_ok());
    }

    #[test]
    fn check_pair_rejects_half_bound() {
        let mut a = record(1);
        let mut b = record(2);
        apply(&mut a, PeerEvent::Seek { ticket: 1 }).unwrap();
        apply(&mut a, PeerEvent::Matched { partner: UserId::new(2) }).unwrap();
        apply(&mut b, PeerEvent::Seek { ticket: 2 }).unwrap();
        assert!(check_pair(&a, &b).is_err());
    }
}
