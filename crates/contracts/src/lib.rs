//! # Contracts
//!
//! Frozen interface contracts shared by every broadcaster crate.
//! All business crates depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Wall-clock instants (`DateTime<Utc>`) are used for anything that leaves the process
//!   (outcome timestamps, run summaries, history export)
//! - Monotonic `Duration`s are used for latency, elapsed time and rates

mod config;
mod error;
mod outcome;
mod payload;
mod recipient;
mod summary;
mod transport;

pub use config::*;
pub use error::*;
pub use outcome::*;
pub use payload::*;
pub use recipient::{ParseRecipientError, Recipient};
pub use summary::*;
pub use transport::*;
