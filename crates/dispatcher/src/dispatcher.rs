//! Dispatcher - runs one broadcast in sequential, concurrency-bounded batches

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    DispatchSettings, MessagePayload, Outcome, OutcomeKind, Recipient, RunTermination, Transport,
    TransportFailure,
};

use crate::aggregator::{RunAggregator, RunReport};
use crate::classifier::{classify, Classification};
use crate::error::DispatchError;
use crate::handle::{CancelHandle, ProgressUpdate, RunHandle};
use crate::rate_gate::RateGate;

const DRY_RUN_DETAIL: &str = "skipped: dry run, no message sent";

/// Broadcast dispatcher over a shared transport
pub struct Dispatcher<T> {
    transport: Arc<T>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T> Dispatcher<T>
where
    T: Transport + Send + Sync + 'static,
{
    pub fn new(transport: T) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    /// Use a transport the caller keeps a handle to (e.g. to inspect a mock)
    pub fn from_arc(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Validate settings and spawn the run
    ///
    /// # Errors
    /// `DispatchError::Config` when the settings are out of range; nothing is
    /// sent in that case.
    #[instrument(
        name = "dispatcher_start",
        skip(self, payload, recipients, settings),
        fields(
            transport = %self.transport.name(),
            recipients = recipients.len(),
            dry_run = settings.dry_run
        )
    )]
    pub fn start(
        &self,
        payload: Arc<MessagePayload>,
        recipients: Vec<Recipient>,
        settings: DispatchSettings,
    ) -> Result<RunHandle, DispatchError> {
        settings.check()?;
        let gate = RateGate::new(settings.concurrency, settings.batch_delay())?;

        let aggregator = Arc::new(RunAggregator::new(recipients, settings.dry_run));
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let cancel = CancelHandle::new();

        let run = BatchRun {
            transport: Arc::clone(&self.transport),
            payload,
            gate,
            aggregator: Arc::clone(&aggregator),
            updates: updates_tx,
            cancel: cancel.clone(),
            dry_run: settings.dry_run,
            send_timeout: settings.send_timeout(),
            dry_run_delay: settings.dry_run_delay(),
        };
        let task = tokio::spawn(run.execute());

        Ok(RunHandle::new(updates_rx, aggregator, cancel, task))
    }

    /// Start a run and wait for its report
    pub async fn run(
        &self,
        payload: Arc<MessagePayload>,
        recipients: Vec<Recipient>,
        settings: DispatchSettings,
    ) -> Result<RunReport, DispatchError> {
        let handle = self.start(payload, recipients, settings)?;
        Ok(handle.wait().await)
    }
}

/// State owned by the spawned run task
struct BatchRun<T> {
    transport: Arc<T>,
    payload: Arc<MessagePayload>,
    gate: RateGate,
    aggregator: Arc<RunAggregator>,
    updates: mpsc::UnboundedSender<ProgressUpdate>,
    cancel: CancelHandle,
    dry_run: bool,
    send_timeout: Duration,
    dry_run_delay: Duration,
}

impl<T> BatchRun<T>
where
    T: Transport + Send + Sync + 'static,
{
    #[instrument(
        name = "dispatcher_run",
        skip(self),
        fields(
            total = self.aggregator.total(),
            batch_size = self.gate.bound(),
            dry_run = self.dry_run
        )
    )]
    async fn execute(self) -> RunReport {
        let recipients = self.aggregator.recipients().to_vec();
        let batch_size = self.gate.bound();
        let batches = recipients.len().div_ceil(batch_size);
        info!(batches, "Broadcast started");

        let mut termination = RunTermination::Completed;

        for (batch, chunk) in recipients.chunks(batch_size).enumerate() {
            if batch > 0 && !self.cancel.is_cancelled() {
                self.gate.pace().await;
            }
            if self.cancel.is_cancelled() {
                info!(batch, "Cancelled at batch boundary");
                termination = RunTermination::Cancelled;
                break;
            }

            if let Err(reason) = self.run_batch(batch, batch * batch_size, chunk).await {
                error!(batch, reason = %reason, "Batch faulted, stopping run");
                termination = RunTermination::Faulted { reason };
                break;
            }

            let snapshot = self.aggregator.snapshot();
            debug!(
                batch,
                completed = snapshot.completed(),
                pending = snapshot.pending,
                "Batch resolved"
            );
        }

        let report = self.aggregator.finalize(termination);
        info!(
            termination = report.summary.termination.as_str(),
            sent = report.summary.sent(),
            failed = report.summary.failed(),
            skipped = report.summary.counts.skipped,
            unprocessed = report.summary.unprocessed.len(),
            "Broadcast finished"
        );
        report
    }

    /// Dispatch one batch and wait for every send in it to resolve
    ///
    /// A panicking send does not stop the others; it is reported as the
    /// batch's fault after the batch has drained.
    #[instrument(
        name = "dispatcher_batch",
        skip(self, chunk),
        fields(size = chunk.len())
    )]
    async fn run_batch(
        &self,
        batch: usize,
        offset: usize,
        chunk: &[Recipient],
    ) -> Result<(), String> {
        let mut sends = JoinSet::new();
        let mut in_flight = HashMap::with_capacity(chunk.len());
        let mut fault = None;

        for (index, &recipient) in chunk.iter().enumerate() {
            let permit = match self.gate.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    fault = Some(e.to_string());
                    break;
                }
            };
            let attempt = SendAttempt {
                transport: Arc::clone(&self.transport),
                payload: Arc::clone(&self.payload),
                recipient,
                position: offset + index,
                batch,
                dry_run: self.dry_run,
                send_timeout: self.send_timeout,
                dry_run_delay: self.dry_run_delay,
            };
            let task = sends.spawn(async move {
                let outcome = attempt.perform().await;
                drop(permit);
                outcome
            });
            in_flight.insert(task.id(), recipient);
        }

        while let Some(joined) = sends.join_next_with_id().await {
            match joined {
                Ok((_, outcome)) => self.emit(outcome),
                Err(e) => {
                    let recipient = in_flight.get(&e.id()).copied();
                    error!(recipient = ?recipient, error = %e, "Send task failed");
                    fault.get_or_insert_with(|| match recipient {
                        Some(r) => format!("send task for recipient {r} failed: {e}"),
                        None => format!("send task failed: {e}"),
                    });
                }
            }
        }

        match fault {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    fn emit(&self, outcome: Outcome) {
        if outcome.kind.is_failure() {
            info!(
                recipient = %outcome.recipient,
                kind = %outcome.kind,
                detail = %outcome.detail,
                "Send failed"
            );
        } else {
            debug!(recipient = %outcome.recipient, kind = %outcome.kind, "Outcome recorded");
        }

        if let Some(snapshot) = self.aggregator.record(outcome.clone()) {
            // The observer may have stopped listening; the run goes on.
            let _ = self.updates.send(ProgressUpdate { outcome, snapshot });
        }
    }
}

/// One recipient's attempt, executed inside its own task
struct SendAttempt<T> {
    transport: Arc<T>,
    payload: Arc<MessagePayload>,
    recipient: Recipient,
    position: usize,
    batch: usize,
    dry_run: bool,
    send_timeout: Duration,
    dry_run_delay: Duration,
}

impl<T> SendAttempt<T>
where
    T: Transport + Send + Sync + 'static,
{
    async fn perform(self) -> Outcome {
        let started = Instant::now();

        let classification = if self.dry_run {
            tokio::time::sleep(self.dry_run_delay).await;
            Classification {
                kind: OutcomeKind::Skipped,
                detail: DRY_RUN_DETAIL.to_string(),
                message_id: None,
            }
        } else {
            let send = self.transport.send(self.recipient, &self.payload);
            let result = match tokio::time::timeout(self.send_timeout, send).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        recipient = %self.recipient,
                        timeout_ms = self.send_timeout.as_millis() as u64,
                        "Send timed out"
                    );
                    Err(TransportFailure::timeout(format!(
                        "no response within {}ms",
                        self.send_timeout.as_millis()
                    )))
                }
            };
            classify(&result)
        };

        Outcome {
            recipient: self.recipient,
            position: self.position,
            batch: self.batch,
            kind: classification.kind,
            detail: classification.detail,
            timestamp: Utc::now(),
            latency: started.elapsed(),
            message_id: classification.message_id,
        }
    }
}
