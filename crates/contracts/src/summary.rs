//! Run-level aggregates: live progress and the finalized summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::outcome::duration_ms;
use crate::{OutcomeCounts, Recipient};

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunTermination {
    /// Every recipient has an outcome
    Completed,
    /// Stopped at a batch boundary on request
    Cancelled,
    /// Stopped by an internal fault; see `reason`
    Faulted { reason: String },
}

impl RunTermination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Faulted { .. } => "faulted",
        }
    }
}

/// Counters visible to progress observers while a run is in flight.
///
/// Always consistent: `sent + failed + skipped + pending == total`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub counts: OutcomeCounts,
    pub pending: u64,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn sent(&self) -> u64 {
        self.counts.sent
    }

    pub fn failed(&self) -> u64 {
        self.counts.failed()
    }

    pub fn skipped(&self) -> u64 {
        self.counts.skipped
    }

    pub fn completed(&self) -> u64 {
        self.counts.processed()
    }

    /// Completed outcomes per second
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed() as f64 / secs
        } else {
            0.0
        }
    }

    /// Fraction of the run that has an outcome, `0.0..=1.0`
    pub fn fraction_done(&self) -> f64 {
        self.completed() as f64 / self.total.max(1) as f64
    }
}

/// Finalized result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Recipients handed to the run
    pub total: u64,

    pub counts: OutcomeCounts,

    /// `sent / attempted * 100`
    pub success_rate: f64,

    pub dry_run: bool,

    pub termination: RunTermination,

    /// Recipients that never received an outcome (cancel / fault), in list order
    #[serde(default)]
    pub unprocessed: Vec<Recipient>,
}

impl RunSummary {
    pub fn sent(&self) -> u64 {
        self.counts.sent
    }

    pub fn failed(&self) -> u64 {
        self.counts.failed()
    }

    pub fn processed(&self) -> u64 {
        self.counts.processed()
    }

    pub fn is_complete(&self) -> bool {
        self.termination == RunTermination::Completed
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}
