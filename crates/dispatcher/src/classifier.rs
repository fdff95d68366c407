//! Error classifier - raw transport result to outcome kind
//!
//! Pure: no I/O, no shared state, same input always gives the same answer.
//! Unknown failure shapes fall through to `ProtocolError`; classification
//! itself cannot fail.

use contracts::{Delivery, OutcomeKind, TransportFailure};

/// Descriptions the Bot API uses (with HTTP 400) for recipients that do not
/// exist or cannot be reached. Matched case-insensitively.
///
/// These count as `Forbidden`, not `BadRequest`, even though the API reports
/// them as a bad request: retrying or fixing the message cannot help, the
/// recipient itself is unreachable.
const UNREACHABLE_MARKERS: [&str; 5] = [
    "chat not found",
    "user not found",
    "bot was blocked",
    "user is deactivated",
    "bot was kicked",
];

/// Classified result of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: OutcomeKind,
    pub detail: String,
    pub message_id: Option<i64>,
}

/// Classify a transport result
pub fn classify(result: &Result<Delivery, TransportFailure>) -> Classification {
    match result {
        Ok(delivery) => Classification {
            kind: OutcomeKind::Sent,
            detail: "sent".to_string(),
            message_id: delivery.message_id,
        },
        Err(failure) => {
            let kind = classify_failure(failure);
            Classification {
                kind,
                detail: describe(kind, failure),
                message_id: None,
            }
        }
    }
}

/// Map a raw failure onto the taxonomy
pub fn classify_failure(failure: &TransportFailure) -> OutcomeKind {
    match failure {
        TransportFailure::Api { error_code: 403, .. } => OutcomeKind::Forbidden,
        TransportFailure::Api {
            error_code: 400,
            description,
            ..
        } => {
            if is_unreachable(description) {
                OutcomeKind::Forbidden
            } else {
                OutcomeKind::BadRequest
            }
        }
        TransportFailure::Api { .. } => OutcomeKind::ProtocolError,
        TransportFailure::Http {
            status: 502..=504, ..
        } => OutcomeKind::NetworkError,
        TransportFailure::Http { .. } => OutcomeKind::ProtocolError,
        TransportFailure::Timeout { .. } | TransportFailure::Connect { .. } => {
            OutcomeKind::NetworkError
        }
        TransportFailure::Decode { .. } | TransportFailure::Other { .. } => {
            OutcomeKind::ProtocolError
        }
    }
}

fn is_unreachable(description: &str) -> bool {
    let lower = description.to_lowercase();
    UNREACHABLE_MARKERS.iter().any(|m| lower.contains(m))
}

fn describe(kind: OutcomeKind, failure: &TransportFailure) -> String {
    match kind {
        OutcomeKind::Forbidden => format!(
            "forbidden: bot was blocked by user or chat not found - {failure}"
        ),
        OutcomeKind::BadRequest => format!("bad_request: invalid request - {failure}"),
        OutcomeKind::NetworkError => format!("network_error: connection issue - {failure}"),
        OutcomeKind::ProtocolError => match failure {
            TransportFailure::Api {
                retry_after: Some(secs),
                ..
            } => format!("protocol_error: {failure} (retry after {secs}s)"),
            _ => format!("protocol_error: {failure}"),
        },
        OutcomeKind::Sent | OutcomeKind::Skipped => failure.to_string(),
    }
}
