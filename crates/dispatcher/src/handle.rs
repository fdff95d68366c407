//! RunHandle - caller side of a spawned broadcast run

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use contracts::{Outcome, ProgressSnapshot, RunTermination};

use crate::aggregator::{RunAggregator, RunReport};

/// One progress event, emitted after every recorded outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub outcome: Outcome,
    /// Counters right after `outcome` was recorded
    pub snapshot: ProgressSnapshot,
}

/// Cooperative cancellation flag, observed at batch boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; sends already admitted run to completion
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Handle to a running broadcast
///
/// Dropping the handle detaches the run. Call [`RunHandle::cancel`] first to
/// stop it at the next batch boundary.
pub struct RunHandle {
    updates: mpsc::UnboundedReceiver<ProgressUpdate>,
    aggregator: Arc<RunAggregator>,
    cancel: CancelHandle,
    task: JoinHandle<RunReport>,
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("total", &self.aggregator.total())
            .field("dry_run", &self.aggregator.is_dry_run())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl RunHandle {
    pub(crate) fn new(
        updates: mpsc::UnboundedReceiver<ProgressUpdate>,
        aggregator: Arc<RunAggregator>,
        cancel: CancelHandle,
        task: JoinHandle<RunReport>,
    ) -> Self {
        Self {
            updates,
            aggregator,
            cancel,
            task,
        }
    }

    /// Swap the awaited task, keeping the progress stream and counters
    pub(crate) fn map_task<F>(self, wrap: F) -> Self
    where
        F: FnOnce(JoinHandle<RunReport>, Arc<RunAggregator>) -> JoinHandle<RunReport>,
    {
        let task = wrap(self.task, Arc::clone(&self.aggregator));
        Self { task, ..self }
    }

    /// Next progress update; `None` once the run has finished and every
    /// update has been consumed
    pub async fn next_update(&mut self) -> Option<ProgressUpdate> {
        self.updates.recv().await
    }

    /// Latest counters
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.aggregator.snapshot()
    }

    pub fn total(&self) -> u64 {
        self.aggregator.total()
    }

    pub fn is_dry_run(&self) -> bool {
        self.aggregator.is_dry_run()
    }

    pub fn cancel(&self) {
        debug!("Cancellation requested");
        self.cancel.cancel();
    }

    /// Cloneable cancel flag (e.g. for a Ctrl+C handler)
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the run to end
    ///
    /// If the run task itself dies, the report is finalized from the outcomes
    /// recorded so far with a `Faulted` termination.
    #[instrument(name = "run_handle_wait", skip(self), fields(total = self.aggregator.total()))]
    pub async fn wait(self) -> RunReport {
        settle(self.task, &self.aggregator).await
    }
}

/// Await a run task, falling back to a `Faulted` partial report if it died
pub(crate) async fn settle(task: JoinHandle<RunReport>, aggregator: &RunAggregator) -> RunReport {
    match task.await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Dispatch task failed");
            aggregator.finalize(RunTermination::Faulted {
                reason: format!("dispatch task failed: {e}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Recipient;

    #[test]
    fn test_cancel_handle_shared() {
        let cancel = CancelHandle::new();
        let clone = cancel.clone();
        assert!(!clone.is_cancelled());
        cancel.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_survives_dead_task() {
        let recipients = vec![Recipient::new(1), Recipient::new(2)];
        let aggregator = Arc::new(RunAggregator::new(recipients.clone(), false));
        let (_tx, rx) = mpsc::unbounded_channel();
        let task: JoinHandle<RunReport> = tokio::spawn(async { panic!("orchestrator crashed") });

        let handle = RunHandle::new(rx, aggregator, CancelHandle::new(), task);
        let report = handle.wait().await;

        assert!(matches!(
            report.summary.termination,
            RunTermination::Faulted { .. }
        ));
        assert_eq!(report.summary.unprocessed, recipients);
    }

    #[tokio::test]
    async fn test_debug_shows_progress_state() {
        let aggregator = Arc::new(RunAggregator::new(vec![Recipient::new(1)], true));
        let (_tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn({
            let aggregator = Arc::clone(&aggregator);
            async move { aggregator.finalize(RunTermination::Completed) }
        });

        let handle = RunHandle::new(rx, aggregator, CancelHandle::new(), task);
        handle.cancel();
        let debug = format!("{handle:?}");
        assert!(debug.starts_with("RunHandle"));
        assert!(debug.contains("total: 1"));
        assert!(debug.contains("dry_run: true"));
        assert!(debug.contains("cancelled: true"));
    }
}
