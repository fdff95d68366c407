//! RunAggregator - live counters and the finalized summary of one run
//!
//! Counters and the outcome set live behind one mutex, so an observer can
//! never see `sent + failed + skipped + pending != total`.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::warn;

use contracts::{
    Outcome, OutcomeCounts, ProgressSnapshot, Recipient, RunSummary, RunTermination,
};

/// Terminal result of a run: the summary plus every recorded outcome
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub summary: RunSummary,
    /// Ordered by position in the recipient list
    pub outcomes: Vec<Outcome>,
}

impl RunReport {
    /// Outcome recorded for the recipient at `position`
    pub fn outcome_at(&self, position: usize) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.position == position)
    }
}

#[derive(Debug)]
struct AggregatorState {
    counts: OutcomeCounts,
    outcomes: Vec<Outcome>,
    recorded: Vec<bool>,
}

/// Accumulates outcomes for one run
#[derive(Debug)]
pub struct RunAggregator {
    recipients: Vec<Recipient>,
    dry_run: bool,
    started_at: DateTime<Utc>,
    started: Instant,
    state: Mutex<AggregatorState>,
}

impl RunAggregator {
    pub fn new(recipients: Vec<Recipient>, dry_run: bool) -> Self {
        let total = recipients.len();
        Self {
            recipients,
            dry_run,
            started_at: Utc::now(),
            started: Instant::now(),
            state: Mutex::new(AggregatorState {
                counts: OutcomeCounts::default(),
                outcomes: Vec::with_capacity(total),
                recorded: vec![false; total],
            }),
        }
    }

    pub fn total(&self) -> u64 {
        self.recipients.len() as u64
    }

    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Record one outcome and return the snapshot taken under the same lock
    ///
    /// Returns `None` (and records nothing) when the position already has an
    /// outcome or does not belong to this run.
    pub fn record(&self, outcome: Outcome) -> Option<ProgressSnapshot> {
        let mut state = self.lock();

        let expected = self.recipients.get(outcome.position).copied();
        if expected != Some(outcome.recipient) {
            warn!(
                recipient = %outcome.recipient,
                position = outcome.position,
                "Outcome does not match run recipient, ignored"
            );
            return None;
        }
        if state.recorded[outcome.position] {
            warn!(
                recipient = %outcome.recipient,
                position = outcome.position,
                "Duplicate outcome rejected"
            );
            return None;
        }

        state.recorded[outcome.position] = true;
        state.counts.record(outcome.kind);
        state.outcomes.push(outcome);
        Some(self.snapshot_of(&state))
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.lock();
        self.snapshot_of(&state)
    }

    /// Build the summary from whatever has been recorded so far
    ///
    /// A `Completed` termination with missing outcomes is downgraded to
    /// `Faulted`; a completed run always covers every recipient.
    pub fn finalize(&self, termination: RunTermination) -> RunReport {
        let state = self.lock();

        let unprocessed: Vec<Recipient> = self
            .recipients
            .iter()
            .zip(&state.recorded)
            .filter(|(_, recorded)| !**recorded)
            .map(|(recipient, _)| *recipient)
            .collect();

        let termination = match termination {
            RunTermination::Completed if !unprocessed.is_empty() => RunTermination::Faulted {
                reason: format!("{} recipients finished without an outcome", unprocessed.len()),
            },
            other => other,
        };

        let mut outcomes = state.outcomes.clone();
        outcomes.sort_by_key(|o| o.position);

        let summary = RunSummary {
            started_at: self.started_at,
            finished_at: Utc::now(),
            total: self.total(),
            counts: state.counts,
            success_rate: state.counts.success_rate(),
            dry_run: self.dry_run,
            termination,
            unprocessed,
        };

        RunReport { summary, outcomes }
    }

    fn snapshot_of(&self, state: &AggregatorState) -> ProgressSnapshot {
        let total = self.total();
        ProgressSnapshot {
            total,
            counts: state.counts,
            pending: total - state.counts.processed(),
            elapsed: self.started.elapsed(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        // State is only mutated inside `record`, which cannot leave it half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
