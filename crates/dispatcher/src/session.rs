//! BroadcastSession - owns run history and cumulative stats
//!
//! At most one run is active per session; a second `start` is rejected
//! instead of being interleaved with the first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use contracts::{
    DispatchSettings, MessagePayload, ProgressSnapshot, Recipient, RunSummary, Transport,
};

use crate::aggregator::RunReport;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::handle::{settle, CancelHandle, ProgressUpdate, RunHandle};
use crate::history::{HistoryLog, HistoryRecord, HISTORY_CAPACITY};

/// Totals across the session's live (non-dry) runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_sent: u64,
    pub total_failed: u64,
    pub broadcast_count: u64,
    pub last_broadcast_at: Option<DateTime<Utc>>,
}

impl SessionStats {
    pub fn success_rate(&self) -> f64 {
        let attempted = self.total_sent + self.total_failed;
        if attempted == 0 {
            0.0
        } else {
            self.total_sent as f64 / attempted as f64 * 100.0
        }
    }

    fn absorb(&mut self, summary: &RunSummary) {
        self.total_sent += summary.sent();
        self.total_failed += summary.failed();
        self.broadcast_count += 1;
        self.last_broadcast_at = Some(summary.finished_at);
    }
}

#[derive(Debug)]
struct SessionInner {
    history: Mutex<HistoryLog>,
    stats: Mutex<SessionStats>,
    active: AtomicBool,
}

/// Lifecycle-scoped broadcast session
#[derive(Debug, Clone)]
pub struct BroadcastSession {
    inner: Arc<SessionInner>,
}

impl Default for BroadcastSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastSession {
    pub fn new() -> Self {
        Self::with_history_capacity(HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                history: Mutex::new(HistoryLog::with_capacity(capacity)),
                stats: Mutex::new(SessionStats::default()),
                active: AtomicBool::new(false),
            }),
        }
    }

    /// Start a run through `dispatcher`
    ///
    /// # Errors
    /// - `DispatchError::RunInProgress` if this session already has a run
    /// - `DispatchError::Config` for invalid settings
    #[instrument(
        name = "session_start",
        skip(self, dispatcher, payload, recipients, settings),
        fields(recipients = recipients.len())
    )]
    pub fn start<T>(
        &self,
        dispatcher: &Dispatcher<T>,
        payload: Arc<MessagePayload>,
        recipients: Vec<Recipient>,
        settings: DispatchSettings,
    ) -> Result<SessionRun, DispatchError>
    where
        T: Transport + Send + Sync + 'static,
    {
        if self
            .inner
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DispatchError::RunInProgress);
        }
        let slot = ActiveSlot {
            inner: Arc::clone(&self.inner),
        };

        // On error `slot` drops here and the session is free again.
        let handle = dispatcher.start(payload, recipients, settings)?;

        // The slot lives with the run task, not with the caller's handle, so
        // a dropped `SessionRun` still blocks new runs until this one is recorded.
        let handle = handle.map_task(move |task, aggregator| {
            tokio::spawn(async move {
                let report = settle(task, &aggregator).await;
                slot.complete(&report.summary);
                drop(slot);
                info!(
                    termination = report.summary.termination.as_str(),
                    success_rate = report.summary.success_rate,
                    "Run recorded in session history"
                );
                report
            })
        });
        Ok(SessionRun { handle })
    }

    pub fn is_running(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Finalized summaries, most recent last
    pub fn history(&self) -> Vec<RunSummary> {
        self.history_log().list()
    }

    pub fn export_history(&self) -> Vec<HistoryRecord> {
        self.history_log().export()
    }

    pub fn stats(&self) -> SessionStats {
        self.session_stats().clone()
    }

    /// Clear history and stats
    pub fn reset(&self) {
        self.history_log().reset();
        *self.session_stats() = SessionStats::default();
        debug!("Session reset");
    }

    fn history_log(&self) -> MutexGuard<'_, HistoryLog> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn session_stats(&self) -> MutexGuard<'_, SessionStats> {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks the session busy until dropped
#[derive(Debug)]
struct ActiveSlot {
    inner: Arc<SessionInner>,
}

impl ActiveSlot {
    fn complete(&self, summary: &RunSummary) {
        let evicted = self
            .inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(summary.clone());
        if evicted.is_some() {
            debug!("History full, oldest run evicted");
        }

        if !summary.dry_run {
            self.inner
                .stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .absorb(summary);
        }
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }
}

/// A run started through a session
///
/// Dropping it detaches the run: it still finishes and is recorded, and the
/// session stays busy until then.
#[derive(Debug)]
pub struct SessionRun {
    handle: RunHandle,
}

impl SessionRun {
    pub async fn next_update(&mut self) -> Option<ProgressUpdate> {
        self.handle.next_update().await
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.handle.snapshot()
    }

    pub fn total(&self) -> u64 {
        self.handle.total()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.cancel_handle()
    }

    /// Wait until the run is recorded in the session and the session is free
    pub async fn wait(self) -> RunReport {
        self.handle.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transports::MockTransport;
    use std::time::Duration;

    fn recipients(n: i64) -> Vec<Recipient> {
        (1..=n).map(Recipient::new).collect()
    }

    fn settings(dry_run: bool) -> DispatchSettings {
        let mut settings = DispatchSettings::new(2, Duration::ZERO, dry_run);
        settings.dry_run_delay_ms = 1;
        settings
    }

    fn payload() -> Arc<MessagePayload> {
        Arc::new(MessagePayload::text("hi"))
    }

    #[tokio::test]
    async fn test_run_is_recorded() {
        let session = BroadcastSession::new();
        let dispatcher = Dispatcher::new(MockTransport::new());

        let run = session
            .start(&dispatcher, payload(), recipients(3), settings(false))
            .unwrap();
        assert!(session.is_running());
        run.wait().await;

        assert!(!session.is_running());
        assert_eq!(session.history().len(), 1);
        let stats = session.stats();
        assert_eq!(stats.total_sent, 3);
        assert_eq!(stats.broadcast_count, 1);
        assert!(stats.last_broadcast_at.is_some());
        assert!((stats.success_rate() - 100.0).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_second_run_rejected() {
        let session = BroadcastSession::new();
        let dispatcher =
            Dispatcher::new(MockTransport::new().with_delay(Duration::from_millis(50)));

        let first = session
            .start(&dispatcher, payload(), recipients(2), settings(false))
            .unwrap();
        let second = session.start(&dispatcher, payload(), recipients(2), settings(false));
        assert!(matches!(second, Err(DispatchError::RunInProgress)));

        first.wait().await;
        assert!(session
            .start(&dispatcher, payload(), recipients(1), settings(false))
            .is_ok());
    }

    #[tokio::test]
    async fn test_dropped_run_keeps_session_busy() {
        let session = BroadcastSession::new();
        let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(50)));
        let dispatcher = Dispatcher::from_arc(Arc::clone(&transport));

        let run = session
            .start(&dispatcher, payload(), recipients(6), settings(false))
            .unwrap();
        drop(run);

        let second = session.start(&dispatcher, payload(), recipients(2), settings(false));
        assert!(matches!(second, Err(DispatchError::RunInProgress)));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while session.is_running() {
            assert!(tokio::time::Instant::now() < deadline, "detached run never finished");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(session.history().len(), 1);
        assert_eq!(session.stats().total_sent, 6);
        assert_eq!(transport.call_count(), 6);
        assert!(transport.peak_in_flight() <= 2);

        session
            .start(&dispatcher, payload(), recipients(1), settings(false))
            .unwrap()
            .wait()
            .await;
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_settings_free_the_session() {
        let session = BroadcastSession::new();
        let dispatcher = Dispatcher::new(MockTransport::new());
        let mut bad = settings(false);
        bad.concurrency = 0;

        assert!(session
            .start(&dispatcher, payload(), recipients(1), bad)
            .is_err());
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_dry_run_skips_stats() {
        let session = BroadcastSession::new();
        let dispatcher = Dispatcher::new(MockTransport::new());

        session
            .start(&dispatcher, payload(), recipients(2), settings(true))
            .unwrap()
            .wait()
            .await;

        assert_eq!(session.history().len(), 1);
        assert_eq!(session.stats(), SessionStats::default());
    }

    #[tokio::test]
    async fn test_reset_clears_history_and_stats() {
        let session = BroadcastSession::with_history_capacity(2);
        let dispatcher = Dispatcher::new(MockTransport::new());
        for _ in 0..3 {
            session
                .start(&dispatcher, payload(), recipients(1), settings(false))
                .unwrap()
                .wait()
                .await;
        }
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.stats().broadcast_count, 3);

        session.reset();
        assert!(session.history().is_empty());
        assert_eq!(session.export_history().len(), 0);
        assert_eq!(session.stats().broadcast_count, 0);
    }
}
