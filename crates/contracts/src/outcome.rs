//! Outcome - result of one send attempt
//!
//! The taxonomy is closed: every raw transport result maps to exactly one
//! [`OutcomeKind`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::Recipient;

/// Outcome taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Transport confirmed delivery acceptance
    Sent,
    /// Recipient blocked the sender or does not exist
    Forbidden,
    /// Malformed request (e.g. payload exceeds service limits)
    BadRequest,
    /// Transient connectivity or timeout failure
    NetworkError,
    /// Any other service-reported failure
    ProtocolError,
    /// Dry-run placeholder, no transport call made
    Skipped,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 6] = [
        Self::Sent,
        Self::Forbidden,
        Self::BadRequest,
        Self::NetworkError,
        Self::ProtocolError,
        Self::Skipped,
    ];

    /// Stable snake_case label (metrics, detail prefixes, exports)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Forbidden => "forbidden",
            Self::BadRequest => "bad_request",
            Self::NetworkError => "network_error",
            Self::ProtocolError => "protocol_error",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_failure(self) -> bool {
        !matches!(self, Self::Sent | Self::Skipped)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable per-recipient result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub recipient: Recipient,

    /// Index of the recipient in the run's list (unique per run)
    pub position: usize,

    /// Batch the recipient was dispatched in
    pub batch: usize,

    pub kind: OutcomeKind,

    /// Human-readable detail, prefixed with the kind label on failures
    pub detail: String,

    /// Completion time of the attempt
    pub timestamp: DateTime<Utc>,

    /// Time spent in the send (or the dry-run simulation)
    #[serde(with = "duration_ms")]
    pub latency: Duration,

    /// Service-assigned message id on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
}

/// Per-kind counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub sent: u64,
    pub forbidden: u64,
    pub bad_request: u64,
    pub network_error: u64,
    pub protocol_error: u64,
    pub skipped: u64,
}

impl OutcomeCounts {
    pub fn record(&mut self, kind: OutcomeKind) {
        *self.slot_mut(kind) += 1;
    }

    pub fn get(&self, kind: OutcomeKind) -> u64 {
        match kind {
            OutcomeKind::Sent => self.sent,
            OutcomeKind::Forbidden => self.forbidden,
            OutcomeKind::BadRequest => self.bad_request,
            OutcomeKind::NetworkError => self.network_error,
            OutcomeKind::ProtocolError => self.protocol_error,
            OutcomeKind::Skipped => self.skipped,
        }
    }

    fn slot_mut(&mut self, kind: OutcomeKind) -> &mut u64 {
        match kind {
            OutcomeKind::Sent => &mut self.sent,
            OutcomeKind::Forbidden => &mut self.forbidden,
            OutcomeKind::BadRequest => &mut self.bad_request,
            OutcomeKind::NetworkError => &mut self.network_error,
            OutcomeKind::ProtocolError => &mut self.protocol_error,
            OutcomeKind::Skipped => &mut self.skipped,
        }
    }

    /// Sum of all failure kinds
    pub fn failed(&self) -> u64 {
        self.forbidden + self.bad_request + self.network_error + self.protocol_error
    }

    /// Number of recipients with an outcome
    pub fn processed(&self) -> u64 {
        self.sent + self.failed() + self.skipped
    }

    /// `sent / attempted * 100`; dry-run placeholders are not attempts.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.sent + self.failed();
        if attempted == 0 {
            0.0
        } else {
            self.sent as f64 / attempted as f64 * 100.0
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (OutcomeKind, u64)> + '_ {
        OutcomeKind::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
