//! Directory records for duet.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DuetError, UserId};

/// Where a participant is in the pairing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    /// Not looking for a partner.
    #[default]
    Idle,
    /// Waiting to be matched with another seeker.
    Seeking,
    /// Bound to exactly one partner.
    Paired,
}

impl PeerState {
    /// Storage/wire name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Seeking => "seeking",
            Self::Paired => "paired",
        }
    }

    /// Parse a state from its storage name.
    pub fn parse(s: &str) -> Result<Self, DuetError> {
        match s {
            "idle" => Ok(Self::Idle),
            "seeking" => Ok(Self::Seeking),
            "paired" => Ok(Self::Paired),
            other => Err(DuetError::InvalidData(format!("unknown peer state: {other}"))),
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display metadata supplied by the transport.
///
/// Not behaviorally significant: the pairing logic never branches on it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Profile {
    /// Given name, if the transport knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Public handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Client language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

impl Profile {
    /// Create a profile carrying only a first name.
    pub fn named(first_name: impl Into<String>) -> Self {
        Self {
            first_name: Some(first_name.into()),
            ..Self::default()
        }
    }

    /// Overlay the fields present in `delta` onto this profile.
    ///
    /// Absent fields in the delta keep their stored value.
    pub fn merge(&mut self, delta: &Profile) {
        if delta.first_name.is_some() {
            self.first_name.clone_from(&delta.first_name);
        }
        if delta.last_name.is_some() {
            self.last_name.clone_from(&delta.last_name);
        }
        if delta.username.is_some() {
            self.username.clone_from(&delta.username);
        }
        if delta.language_code.is_some() {
            self.language_code.clone_from(&delta.language_code);
        }
    }

    /// Best human-readable name, falling back to the username.
    pub fn display_name(&self) -> Option<&str> {
        self.first_name
            .as_deref()
            .or(self.username.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// One participant's seat in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Primary key.
    pub id: UserId,
    /// Current lifecycle state.
    pub state: PeerState,
    /// Current partner; set iff `state == Paired`.
    pub partner_id: Option<UserId>,
    /// FIFO ticket taken when the user entered `Seeking`.
    pub seeking_since: Option<u64>,
    /// Display metadata.
    pub profile: Profile,
}

impl UserRecord {
    /// A fresh idle record, as created on first contact.
    pub fn new(id: UserId, profile: Profile) -> Self {
        Self {
            id,
            state: PeerState::Idle,
            partner_id: None,
            seeking_since: None,
            profile,
        }
    }

    /// True if this record is paired with `other`.
    pub fn is_paired_with(&self, other: UserId) -> bool {
        self.state == PeerState::Paired && self.partner_id == Some(other)
    }

    /// Check the invariants that can be verified on a single record.
    ///
    /// Mutual pairing needs both records and is checked by the directory.
    pub fn check_local_invariants(&self) -> Result<(), DuetError> {
        if self.partner_id == Some(self.id) {
            return Err(DuetError::InvariantViolated(format!(
                "{} is its own partner",
                self.id
            )));
        }
        match (self.state, self.partner_id) {
            (PeerState::Paired, None) => Err(DuetError::InvariantViolated(format!(
                "{} is paired without a partner",
                self.id
            ))),
            (PeerState::Idle | PeerState::Seeking, Some(partner)) => {
                Err(DuetError::InvariantViolated(format!(
                    "{} is {} but still points at {}",
                    self.id, self.state, partner
                )))
            }
            _ => Ok(()),
        }
    }
}
