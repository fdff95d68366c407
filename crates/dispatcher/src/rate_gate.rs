//! RateGate - bounds in-flight sends and paces batches
//!
//! At most `bound` permits are outstanding at any instant. A permit is
//! returned when it is dropped, so a send task that fails or panics still
//! gives its slot back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};

use contracts::{ContractError, MAX_CONCURRENCY, MIN_CONCURRENCY};

use crate::error::DispatchError;

/// Permission to perform one send
#[derive(Debug)]
pub struct SendPermit {
    _permit: OwnedSemaphorePermit,
}

/// Concurrency limiter plus inter-batch pacing
#[derive(Debug, Clone)]
pub struct RateGate {
    semaphore: Arc<Semaphore>,
    bound: usize,
    batch_delay: Duration,
}

impl RateGate {
    /// Create a gate with `bound` concurrent permits and a pacing delay
    ///
    /// # Errors
    /// `bound` outside `1..=50`
    pub fn new(bound: usize, batch_delay: Duration) -> Result<Self, DispatchError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&bound) {
            return Err(DispatchError::Config(ContractError::config_validation(
                "concurrency",
                format!(
                    "concurrency must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}, got {bound}"
                ),
            )));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(bound)),
            bound,
            batch_delay,
        })
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    pub fn batch_delay(&self) -> Duration {
        self.batch_delay
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait until fewer than `bound` permits are held, then take one
    pub async fn acquire(&self) -> Result<SendPermit, DispatchError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::internal("rate gate closed"))?;
        Ok(SendPermit { _permit: permit })
    }

    /// Return a permit explicitly (same as dropping it)
    pub fn release(&self, permit: SendPermit) {
        drop(permit);
    }

    /// Sleep for the inter-batch delay
    #[instrument(name = "rate_gate_pace", skip(self), fields(delay_ms = self.batch_delay.as_millis() as u64))]
    pub async fn pace(&self) {
        if self.batch_delay.is_zero() {
            return;
        }
        debug!("Pacing before next batch");
        tokio::time::sleep(self.batch_delay).await;
    }
}
