//! # Dispatcher
//!
//! Broadcast dispatch engine.
//!
//! Responsibilities:
//! - Fan a single message out to many recipients in concurrency-bounded,
//!   paced batches
//! - Classify every transport result into an outcome without aborting the run
//! - Aggregate live progress and the final run summary
//! - Keep a bounded history of finished runs per session

pub mod aggregator;
pub mod classifier;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod history;
pub mod rate_gate;
pub mod session;
pub mod transports;

pub use aggregator::{RunAggregator, RunReport};
pub use classifier::{classify, classify_failure, Classification};
pub use contracts::{Transport, TransportFailure};
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use handle::{CancelHandle, ProgressUpdate, RunHandle};
pub use history::{HistoryLog, HistoryRecord, HISTORY_CAPACITY};
pub use rate_gate::{RateGate, SendPermit};
pub use session::{BroadcastSession, SessionRun, SessionStats};
pub use transports::{MockCall, MockResponse, MockTransport, TelegramTransport};
