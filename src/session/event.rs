//! Event model for the session bus
//!
//! Kinds arrive either from local classification or straight from an
//! envelope status; severity and dialog policy derive from the kind.

use crate::gateway::Status;
use chrono::Utc;
use std::fmt;

/// Severity recorded in the session log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Notice,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Notice => "notice",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of an incoming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Info,
    Notice,
    Error,
    Critical,
    Ko,
    Invalid,
    InvalidSession,
    /// Anything unrecognized. Handled like `Critical` so no failure is
    /// ever silently dropped.
    Other(String),
}

impl EventKind {
    /// Kind matching a non-OK envelope status.
    pub fn from_status(status: Status) -> EventKind {
        match status {
            Status::Ok => EventKind::Info,
            Status::Ko => EventKind::Ko,
            Status::Invalid => EventKind::Invalid,
            Status::InvalidSession => EventKind::InvalidSession,
        }
    }

    /// Severity the log records for this kind.
    pub fn severity(&self) -> Severity {
        match self {
            EventKind::Info => Severity::Info,
            EventKind::Notice => Severity::Notice,
            EventKind::Error | EventKind::InvalidSession => Severity::Error,
            EventKind::Critical | EventKind::Ko | EventKind::Invalid | EventKind::Other(_) => {
                Severity::Critical
            }
        }
    }

    /// Kinds that surface a blocking dialog on top of the log entry.
    pub fn needs_dialog(&self) -> bool {
        matches!(
            self,
            EventKind::Critical | EventKind::Ko | EventKind::Invalid | EventKind::Other(_)
        )
    }

    /// Kinds that invalidate the session outright.
    pub fn ends_session(&self) -> bool {
        matches!(self, EventKind::InvalidSession)
    }
}

/// A single entry in the session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub severity: Severity,
    pub msg: String,
}

impl Event {
    pub fn new(severity: Severity, msg: impl Into<String>) -> Event {
        Event {
            timestamp: Utc::now().timestamp(),
            severity,
            msg: msg.into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.timestamp, self.severity, self.msg)
    }
}
