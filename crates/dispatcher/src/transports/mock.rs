//! MockTransport - scripted in-memory transport that records every call

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{sleep, Instant};

use contracts::{Delivery, MessagePayload, Recipient, Transport, TransportFailure};

/// Scripted answer for one send
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    Deliver,
    Fail(TransportFailure),
    /// Panic inside `send` (fault injection)
    Panic,
}

/// One completed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockCall {
    pub recipient: Recipient,
    pub started: Instant,
    pub finished: Instant,
}

/// Scripted transport for tests and demos
#[derive(Debug)]
pub struct MockTransport {
    default_response: MockResponse,
    responses: HashMap<Recipient, MockResponse>,
    default_delay: Duration,
    delays: HashMap<Recipient, Duration>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    next_message_id: AtomicI64,
    calls: Mutex<Vec<MockCall>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Every send succeeds immediately
    pub fn new() -> Self {
        Self {
            default_response: MockResponse::Deliver,
            responses: HashMap::new(),
            default_delay: Duration::ZERO,
            delays: HashMap::new(),
            attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            next_message_id: AtomicI64::new(1),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default(mut self, response: MockResponse) -> Self {
        self.default_response = response;
        self
    }

    pub fn with_response(mut self, recipient: Recipient, response: MockResponse) -> Self {
        self.responses.insert(recipient, response);
        self
    }

    /// Delay applied to every send
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn with_delay_for(mut self, recipient: Recipient, delay: Duration) -> Self {
        self.delays.insert(recipient, delay);
        self
    }

    /// Number of `send` invocations, including ones that panicked
    pub fn call_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Calls that returned, in completion order
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock_calls().clone()
    }

    /// Highest number of sends observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decrements the in-flight counter even when the send is dropped mid-way
/// (e.g. by a timeout)
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(
        &self,
        recipient: Recipient,
        _payload: &MessagePayload,
    ) -> Result<Delivery, TransportFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let started = Instant::now();
        let delay = self
            .delays
            .get(&recipient)
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            sleep(delay).await;
        }

        let response = self
            .responses
            .get(&recipient)
            .unwrap_or(&self.default_response)
            .clone();

        let result = match response {
            MockResponse::Deliver => Ok(Delivery {
                message_id: Some(self.next_message_id.fetch_add(1, Ordering::SeqCst)),
            }),
            MockResponse::Fail(failure) => Err(failure),
            MockResponse::Panic => panic!("mock transport panic for recipient {recipient}"),
        };

        self.lock_calls().push(MockCall {
            recipient,
            started,
            finished: Instant::now(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses() {
        let blocked = Recipient::new(2);
        let transport = MockTransport::new().with_response(
            blocked,
            MockResponse::Fail(TransportFailure::api(403, "Forbidden")),
        );
        let payload = MessagePayload::text("hi");

        assert!(transport.send(Recipient::new(1), &payload).await.is_ok());
        assert!(transport.send(blocked, &payload).await.is_err());
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.calls()[1].recipient, blocked);
    }

    #[tokio::test]
    async fn test_message_ids_increase() {
        let transport = MockTransport::new();
        let payload = MessagePayload::text("hi");
        let a = transport.send(Recipient::new(1), &payload).await.unwrap();
        let b = transport.send(Recipient::new(1), &payload).await.unwrap();
        assert!(b.message_id > a.message_id);
    }

    #[tokio::test]
    async fn test_delay_is_recorded() {
        let transport = MockTransport::new().with_delay(Duration::from_millis(20));
        transport
            .send(Recipient::new(1), &MessagePayload::text("hi"))
            .await
            .unwrap();
        let call = transport.calls()[0];
        assert!(call.finished - call.started >= Duration::from_millis(20));
        assert_eq!(transport.peak_in_flight(), 1);
    }
}
