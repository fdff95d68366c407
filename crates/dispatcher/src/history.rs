//! HistoryLog - bounded FIFO of finalized run summaries

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use contracts::RunSummary;

/// Summaries kept before the oldest is evicted
pub const HISTORY_CAPACITY: usize = 10;

/// Flat export row for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// When the run finished
    pub timestamp: DateTime<Utc>,
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
    pub success_rate: f64,
    pub dry_run: bool,
    pub termination: String,
}

impl From<&RunSummary> for HistoryRecord {
    fn from(summary: &RunSummary) -> Self {
        Self {
            timestamp: summary.finished_at,
            total: summary.total,
            sent: summary.sent(),
            failed: summary.failed(),
            skipped: summary.counts.skipped,
            success_rate: summary.success_rate,
            dry_run: summary.dry_run,
            termination: summary.termination.as_str().to_string(),
        }
    }
}

/// Completion-ordered run summaries, most recent last
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<RunSummary>,
    capacity: usize,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// A log holding at most `capacity` entries (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the tail; returns the evicted head when over capacity
    pub fn append(&mut self, summary: RunSummary) -> Option<RunSummary> {
        self.entries.push_back(summary);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn list(&self) -> Vec<RunSummary> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunSummary> + '_ {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&RunSummary> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn export(&self) -> Vec<HistoryRecord> {
        self.entries.iter().map(HistoryRecord::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{OutcomeCounts, RunTermination};

    fn summary(total: u64) -> RunSummary {
        let now = Utc::now();
        RunSummary {
            started_at: now,
            finished_at: now,
            total,
            counts: OutcomeCounts {
                sent: total,
                ..OutcomeCounts::default()
            },
            success_rate: 100.0,
            dry_run: false,
            termination: RunTermination::Completed,
            unprocessed: Vec::new(),
        }
    }

    #[test]
    fn test_evicts_oldest_after_capacity() {
        let mut log = HistoryLog::new();
        for total in 1..=HISTORY_CAPACITY as u64 {
            assert!(log.append(summary(total)).is_none());
        }
        let evicted = log.append(summary(11)).unwrap();
        assert_eq!(evicted.total, 1);

        let totals: Vec<u64> = log.iter().map(|s| s.total).collect();
        assert_eq!(totals, (2..=11).collect::<Vec<_>>());
        assert_eq!(log.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_list_is_restartable() {
        let mut log = HistoryLog::with_capacity(3);
        log.append(summary(1));
        log.append(summary(2));
        assert_eq!(log.list(), log.list());
        assert_eq!(log.latest().map(|s| s.total), Some(2));
    }

    #[test]
    fn test_reset() {
        let mut log = HistoryLog::with_capacity(2);
        log.append(summary(1));
        log.reset();
        assert!(log.is_empty());
        assert!(log.export().is_empty());
    }

    #[test]
    fn test_export_rows() {
        let mut log = HistoryLog::new();
        log.append(summary(4));
        let rows = log.export();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sent, 4);
        assert_eq!(rows[0].termination, "completed");

        let json = serde_json::to_string(&rows).unwrap();
        assert!(json.contains("\"success_rate\":100.0"), "got: {json}");
    }
}
