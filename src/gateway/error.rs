//! Typed errors for gateway operations
//!
//! Mirrors the failure taxonomy of the appliance protocol: the exchange
//! never completed, the reply failed the envelope gate, the appliance
//! rejected the operation, or the fault was local to this client.

use crate::gateway::envelope::{render_text, EnvelopeError, Status};
use serde_json::Value;
use thiserror::Error;

/// Gateway operation errors with typed variants
///
/// Enables callers to distinguish between different failure modes:
/// - `Transport` - no usable reply; connection, TLS, timeout, or a
///   non-2xx status on a binary endpoint
/// - `Envelope` - a reply arrived but is not a valid envelope
/// - `Rejected` - the appliance answered with a non-OK envelope
/// - `Client` - local failure before or after the exchange
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The exchange never produced a usable reply body.
    #[error("request failed: {0}")]
    Transport(String),

    /// The reply arrived but failed the envelope gate. Nothing of the
    /// payload is trusted or propagated.
    #[error("invalid backend response: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The appliance refused the operation. The message carries the
    /// rendered `response` payload.
    #[error("{status}: {message}")]
    Rejected { status: Status, message: String },

    /// Local fault: file I/O around a transfer, a payload that does not
    /// decode, a malformed argument.
    #[error(transparent)]
    Client(#[from] anyhow::Error),
}

impl GatewayError {
    /// Builds the rejection for a non-OK envelope.
    pub fn rejected(status: Status, response: &Value) -> Self {
        GatewayError::Rejected {
            status,
            message: render_text(response),
        }
    }

    /// Convert connection-level errors into the transport variant.
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Transport(format!("request timeout: {e}"))
        } else if e.is_connect() {
            GatewayError::Transport(format!("connection failed: {e}"))
        } else {
            GatewayError::Transport(e.to_string())
        }
    }

    /// Local decode failure for a payload that passed the envelope gate.
    pub fn malformed(what: &str, e: impl std::fmt::Display) -> Self {
        GatewayError::Client(anyhow::anyhow!("malformed {what} payload: {e}"))
    }

    /// True when the appliance declared the session invalid.
    pub fn is_invalid_session(&self) -> bool {
        matches!(
            self,
            GatewayError::Rejected {
                status: Status::InvalidSession,
                ..
            }
        )
    }

    /// True when the request never completed.
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejected_renders_array_payloads() {
        let err = GatewayError::rejected(Status::Ko, &json!(["first", "second"]));
        match &err {
            GatewayError::Rejected { status, message } => {
                assert_eq!(*status, Status::Ko);
                assert_eq!(message, "first\nsecond");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert_eq!(err.to_string(), "KO: first\nsecond");
    }

    #[test]
    fn invalid_session_predicate() {
        let err = GatewayError::rejected(Status::InvalidSession, &json!("expired"));
        assert!(err.is_invalid_session());
        assert!(!err.is_transport());

        let err = GatewayError::rejected(Status::Ko, &json!("denied"));
        assert!(!err.is_invalid_session());
    }

    #[test]
    fn envelope_errors_convert() {
        let err = GatewayError::from(EnvelopeError::MissingResponse);
        assert!(matches!(err, GatewayError::Envelope(_)));
        assert_eq!(
            err.to_string(),
            "invalid backend response: missing response field"
        );
    }

    #[test]
    fn malformed_is_a_client_error() {
        let err = GatewayError::malformed("file listing", "expected array");
        assert!(matches!(err, GatewayError::Client(_)));
        assert!(err.to_string().contains("file listing"));
    }
}
