//! Broadcast orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{BroadcastJob, Orchestrator};
pub use stats::BroadcastStats;
