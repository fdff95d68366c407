//! Broadcast orchestrator - drives one session run and observes its progress.

use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{DispatchSettings, MessagePayload, Recipient, Transport};
use dispatcher::{BroadcastSession, CancelHandle, Dispatcher};
use observability::{
    record_batch, record_outcome, record_progress, record_run_summary, DeliveryStatsAggregator,
};
use tracing::{info, instrument, warn};

use super::BroadcastStats;
use crate::error::Result;

/// How often progress is logged while a run is in flight
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// Everything one broadcast needs
#[derive(Debug, Clone)]
pub struct BroadcastJob {
    pub payload: Arc<MessagePayload>,
    pub recipients: Vec<Recipient>,
    pub settings: DispatchSettings,
}

/// Runs broadcast jobs through a session
pub struct Orchestrator<T> {
    dispatcher: Dispatcher<T>,
    session: BroadcastSession,
}

impl<T> Orchestrator<T>
where
    T: Transport + Send + Sync + 'static,
{
    pub fn new(dispatcher: Dispatcher<T>, session: BroadcastSession) -> Self {
        Self {
            dispatcher,
            session,
        }
    }

    /// Run one job to completion
    ///
    /// Ctrl+C / SIGTERM cancels the run at the next batch boundary.
    #[instrument(
        name = "orchestrator_run",
        skip(self, job),
        fields(
            recipients = job.recipients.len(),
            concurrency = job.settings.concurrency,
            dry_run = job.settings.dry_run
        )
    )]
    pub async fn run(&self, job: BroadcastJob) -> Result<BroadcastStats> {
        let mut run = self
            .session
            .start(&self.dispatcher, job.payload, job.recipients, job.settings)?;

        let watcher = tokio::spawn(cancel_on_shutdown(run.cancel_handle()));

        let mut delivery = DeliveryStatsAggregator::new();
        let mut last_log = Instant::now();

        while let Some(update) = run.next_update().await {
            let outcome = &update.outcome;
            record_outcome(outcome.kind, outcome.latency);
            if delivery.update(outcome) {
                record_batch(outcome.batch);
            }

            let snapshot = update.snapshot;
            record_progress(&snapshot);
            if snapshot.pending == 0 || last_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                info!(
                    completed = snapshot.completed(),
                    total = snapshot.total,
                    sent = snapshot.sent(),
                    failed = snapshot.failed(),
                    pending = snapshot.pending,
                    rate = format!("{:.1}/s", snapshot.rate()),
                    "Progress"
                );
                last_log = Instant::now();
            }
        }

        let report = run.wait().await;
        watcher.abort();
        record_run_summary(&report.summary);

        Ok(BroadcastStats {
            report,
            delivery: delivery.summary(),
            history: self.session.export_history(),
        })
    }
}

/// Cancel the run when the process is asked to stop
async fn cancel_on_shutdown(cancel: CancelHandle) {
    shutdown_signal().await;
    warn!("Received shutdown signal, stopping after the current batch...");
    cancel.cancel();
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{OutcomeKind, RunTermination, TransportFailure};
    use dispatcher::{MockResponse, MockTransport};

    fn job(n: i64, dry_run: bool) -> BroadcastJob {
        let mut settings = DispatchSettings::new(2, Duration::ZERO, dry_run);
        settings.dry_run_delay_ms = 1;
        BroadcastJob {
            payload: Arc::new(MessagePayload::text("hello")),
            recipients: (1..=n).map(Recipient::new).collect(),
            settings,
        }
    }

    #[tokio::test]
    async fn test_orchestrator_collects_stats() {
        let transport = MockTransport::new().with_response(
            Recipient::new(3),
            MockResponse::Fail(TransportFailure::api(403, "Forbidden: bot was blocked by the user")),
        );
        let orchestrator = Orchestrator::new(Dispatcher::new(transport), BroadcastSession::new());

        let stats = orchestrator.run(job(5, false)).await.unwrap();

        assert_eq!(stats.report.summary.termination, RunTermination::Completed);
        assert_eq!(stats.delivery.counts.sent, 4);
        assert_eq!(stats.delivery.counts.get(OutcomeKind::Forbidden), 1);
        assert_eq!(stats.delivery.batches, 3);
        assert_eq!(stats.history.len(), 1);
    }

    #[tokio::test]
    async fn test_orchestrator_dry_run() {
        let orchestrator =
            Orchestrator::new(Dispatcher::new(MockTransport::new()), BroadcastSession::new());
        let stats = orchestrator.run(job(3, true)).await.unwrap();

        assert_eq!(stats.report.summary.counts.skipped, 3);
        assert!(stats.history[0].dry_run);
    }
}
