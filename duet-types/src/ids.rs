//! Identity types for duet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DuetError;

/// A stable identifier for a participant.
///
/// This is the numeric chat id handed to us by the messaging transport. It
/// never changes for a given participant, so it doubles as the directory's
/// primary key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Create a UserId from the transport's chat id.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the numeric value of this UserId.
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for UserId {
    type Err = DuetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| DuetError::InvalidData(format!("not a user id: {s:?}")))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_bare_number() {
        assert_eq!(UserId::new(-100123).to_string(), "-100123");
    }

    #[test]
    fn parse_from_path_segment() {
        let id: UserId = "42".parse().unwrap();
        assert_eq!(id, UserId::new(42));
        assert!("forty-two".parse::<UserId>().is_err());
    }

    #[test]
    fn ordering_follows_numeric_value() {
        assert!(UserId::new(-5) < UserId::new(3));
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&UserId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
