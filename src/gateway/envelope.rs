//! Response envelope validation
//!
//! Every JSON endpoint on the appliance wraps its reply in
//! `{"status": ..., "response": ...}`. This is the only place that shape
//! is inspected; a payload that fails the gate never reaches a caller.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Reply statuses the appliance is allowed to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Ko,
    Invalid,
    InvalidSession,
}

impl Status {
    /// Parses the wire form. Anything outside the closed set is refused.
    pub fn parse(raw: &str) -> Option<Status> {
        match raw {
            "OK" => Some(Status::Ok),
            "KO" => Some(Status::Ko),
            "INVALID" => Some(Status::Invalid),
            "INVALID_SESSION" => Some(Status::InvalidSession),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Ko => "KO",
            Status::Invalid => "INVALID",
            Status::InvalidSession => "INVALID_SESSION",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ways a reply body can fail the gate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("reply body is not a JSON object")]
    NotAnObject,
    #[error("missing or non-string status field")]
    MissingStatus,
    #[error("unknown status {0:?}")]
    UnknownStatus(String),
    #[error("missing response field")]
    MissingResponse,
}

/// A reply that passed the gate.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub status: Status,
    pub response: Value,
}

impl Envelope {
    /// Validates a raw reply body. The `response` key must be present;
    /// JSON `null` is an acceptable value for it.
    pub fn parse(body: Value) -> Result<Envelope, EnvelopeError> {
        let obj = match body {
            Value::Object(obj) => obj,
            _ => return Err(EnvelopeError::NotAnObject),
        };

        let raw = obj
            .get("status")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingStatus)?;
        let status =
            Status::parse(raw).ok_or_else(|| EnvelopeError::UnknownStatus(raw.to_string()))?;

        let response = obj
            .get("response")
            .cloned()
            .ok_or(EnvelopeError::MissingResponse)?;

        Ok(Envelope { status, response })
    }
}

/// Renders a reply payload for event messages: strings verbatim, arrays
/// newline-joined, everything else as compact JSON.
pub fn render_text(payload: &Value) -> String {
    match payload {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
