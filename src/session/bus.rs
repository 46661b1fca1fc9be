//! Event classification and dialog bookkeeping
//!
//! One bus per application. Every event lands in the bounded log and is
//! mirrored to tracing; kind decides the rest: dialog-class events open
//! or extend the single error dialog, `INVALID_SESSION` tears the
//! session down and returns the user to the login view.

use crate::gateway::GatewayError;
use crate::notify::ViewSink;
use crate::session::event::{Event, EventKind, Severity};
use crate::session::log::EventLog;
use crate::session::SessionContext;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    session: SessionContext,
    log: Mutex<EventLog>,
    dialog: Mutex<DialogState>,
    view: RwLock<Option<Arc<dyn ViewSink>>>,
}

#[derive(Default)]
struct DialogState {
    open: bool,
    messages: Vec<String>,
}

impl EventBus {
    pub fn new(session: SessionContext) -> EventBus {
        EventBus {
            inner: Arc::new(BusInner {
                session,
                log: Mutex::new(EventLog::new()),
                dialog: Mutex::new(DialogState::default()),
                view: RwLock::new(None),
            }),
        }
    }

    /// Installs the view collaborator. Events raised before this point
    /// log without view transitions.
    pub fn attach_view(&self, view: Arc<dyn ViewSink>) {
        *self.inner.view.write().unwrap() = Some(view);
    }

    fn view(&self) -> Option<Arc<dyn ViewSink>> {
        self.inner.view.read().unwrap().clone()
    }

    /// Classifies and records one event.
    pub fn emit(&self, kind: EventKind, msg: impl Into<String>) {
        let msg = msg.into();
        let severity = kind.severity();

        match severity {
            Severity::Info | Severity::Notice => {
                tracing::info!(target: "lockbox::events", "{severity}: {msg}")
            }
            Severity::Error => tracing::warn!(target: "lockbox::events", "{msg}"),
            Severity::Critical => tracing::error!(target: "lockbox::events", "{msg}"),
        }

        if kind.ends_session() {
            self.inner.session.clear();
            if let Some(view) = self.view() {
                view.show_login();
            }
        } else if kind.needs_dialog() {
            self.open_or_append(&msg);
        }

        self.inner.log.lock().unwrap().append(Event::new(severity, msg));
    }

    fn open_or_append(&self, msg: &str) {
        let text = strip_source_prefix(msg).to_string();
        let mut dialog = self.inner.dialog.lock().unwrap();
        if dialog.open {
            dialog.messages.push(text.clone());
            if let Some(view) = self.view() {
                view.error_dialog_appended(&text);
            }
        } else {
            dialog.open = true;
            dialog.messages = vec![text];
            if let Some(view) = self.view() {
                view.error_dialog_opened(&dialog.messages);
            }
        }
    }

    /// The view acknowledged the dialog; the next dialog-class event
    /// opens a fresh one.
    pub fn dialog_closed(&self) {
        let mut dialog = self.inner.dialog.lock().unwrap();
        dialog.open = false;
        dialog.messages.clear();
    }

    pub fn dialog_open(&self) -> bool {
        self.inner.dialog.lock().unwrap().open
    }

    pub fn dialog_messages(&self) -> Vec<String> {
        self.inner.dialog.lock().unwrap().messages.clone()
    }

    /// Funnel for gateway results: a rejection maps onto the kind of its
    /// envelope status, everything else is critical.
    pub fn report(&self, source: &str, err: &GatewayError) {
        match err {
            GatewayError::Rejected { status, message } => self.emit(
                EventKind::from_status(*status),
                format!("[{source}] {message}"),
            ),
            other => self.emit(EventKind::Critical, format!("[{source}] {other}")),
        }
    }

    /// Log entries oldest to newest.
    pub fn log_events(&self) -> Vec<Event> {
        self.inner.log.lock().unwrap().in_order().cloned().collect()
    }

    /// Log entries in slot order, slot 0 first.
    pub fn log_slots(&self) -> Vec<Event> {
        self.inner.log.lock().unwrap().slots().to_vec()
    }

    pub fn log_len(&self) -> usize {
        self.inner.log.lock().unwrap().len()
    }
}

/// Dialog text drops the `[source]` marker events carry in the log.
fn strip_source_prefix(msg: &str) -> &str {
    if let Some(rest) = msg.strip_prefix('[') {
        if let Some(pos) = rest.find(']') {
            return rest[pos + 1..].trim_start();
        }
    }
    msg
}
