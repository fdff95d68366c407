//! Transport trait - Dispatcher output interface
//!
//! One asynchronous call per recipient, no batching at the transport level.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{MessagePayload, Recipient};

/// Accepted send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Service-assigned message id, if the service reports one
    pub message_id: Option<i64>,
}

/// Raw failure as reported by a transport, before classification.
///
/// Shapes mirror what a Bot API client can observe; anything that does not
/// fit goes to `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "shape")]
pub enum TransportFailure {
    /// Service answered with an error envelope (`ok: false`)
    Api {
        error_code: i64,
        description: String,
        retry_after: Option<u64>,
    },
    /// HTTP error without a parseable envelope
    Http { status: u16, body: String },
    /// Request or response exceeded its deadline
    Timeout { message: String },
    /// Could not reach the service
    Connect { message: String },
    /// Response body could not be decoded
    Decode { message: String },
    Other { message: String },
}

impl TransportFailure {
    pub fn api(error_code: i64, description: impl Into<String>) -> Self {
        Self::Api {
            error_code,
            description: description.into(),
            retry_after: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api {
                error_code,
                description,
                ..
            } => write!(f, "api error {error_code}: {description}"),
            Self::Http { status, body } => write!(f, "http {status}: {body}"),
            Self::Timeout { message } => write!(f, "timed out: {message}"),
            Self::Connect { message } => write!(f, "connect failed: {message}"),
            Self::Decode { message } => write!(f, "decode failed: {message}"),
            Self::Other { message } => f.write_str(message),
        }
    }
}

/// Messaging transport
///
/// All transport implementations must implement this trait.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Transport name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Send the payload to a single recipient
    ///
    /// # Errors
    /// Returns the raw failure; classification happens in the dispatcher
    async fn send(
        &self,
        recipient: Recipient,
        payload: &MessagePayload,
    ) -> Result<Delivery, TransportFailure>;
}
