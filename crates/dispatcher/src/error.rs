//! Dispatcher error types
//!
//! Only run-preventing problems are errors. Per-recipient failures become
//! outcomes and never surface here.

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Invalid settings (concurrency bound, batch delay, ...)
    #[error("invalid dispatch configuration: {0}")]
    Config(#[from] contracts::ContractError),

    /// A second run was started while one is active in the same session
    #[error("invalid dispatch configuration: a broadcast run is already in progress")]
    RunInProgress,

    /// The orchestrating task died; the partial summary is still available
    #[error("internal dispatch fault: {message}")]
    Internal { message: String },
}

impl DispatchError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the caller supplied something invalid (vs. an internal fault)
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::RunInProgress)
    }
}
