//! Recipient - validated chat identifier
//!
//! Numeric and signed: negative identifiers address groups/channels,
//! positive ones address individual users.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validated target of one send attempt.
///
/// `Copy` and immutable, so it can be handed to every send task without
/// any bookkeeping.
///
/// # Examples
/// ```
/// use contracts::Recipient;
///
/// let user: Recipient = "123456789".parse().unwrap();
/// let group: Recipient = " -100200300 ".parse().unwrap();
/// assert!(!user.is_group());
/// assert!(group.is_group());
/// assert_eq!(group.to_string(), "-100200300");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipient(i64);

impl Recipient {
    #[inline]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn id(self) -> i64 {
        self.0
    }

    /// Groups, supergroups and channels carry negative identifiers.
    #[inline]
    pub const fn is_group(self) -> bool {
        self.0 < 0
    }
}

impl From<i64> for Recipient {
    #[inline]
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejected recipient literal
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid recipient '{raw}': {reason}")]
pub struct ParseRecipientError {
    pub raw: String,
    pub reason: &'static str,
}

impl FromStr for Recipient {
    type Err = ParseRecipientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);

        let reject = |reason| ParseRecipientError {
            raw: s.to_string(),
            reason,
        };

        if digits.is_empty() {
            return Err(reject("empty identifier"));
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(reject("identifier must be numeric"));
        }

        trimmed
            .parse::<i64>()
            .map(Self)
            .map_err(|_| reject("identifier out of range"))
    }
}
