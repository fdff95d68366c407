//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parsing or validation error
    #[error("Invalid configuration: {0}")]
    Config(#[from] contracts::ContractError),

    /// Recipient file yielded no usable chat ids
    #[error("No valid recipients in {path}")]
    NoRecipients { path: String },

    /// Message text is empty after trimming
    #[error("Message text is empty")]
    EmptyMessage,

    /// A live run needs a bot token
    #[error("Bot token missing: pass --token or set TELEGRAM_TOKEN")]
    MissingToken,

    /// Run could not start or ended in a fault
    #[error("Broadcast failed: {message}")]
    Broadcast { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn no_recipients(path: impl Into<String>) -> Self {
        Self::NoRecipients { path: path.into() }
    }

    pub fn broadcast(message: impl Into<String>) -> Self {
        Self::Broadcast {
            message: message.into(),
        }
    }
}

impl From<dispatcher::DispatchError> for CliError {
    fn from(err: dispatcher::DispatchError) -> Self {
        Self::broadcast(err.to_string())
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
