//! Stub appliance and recording view for integration tests
//!
//! The stub serves programmable replies over loopback and records every
//! request it sees, so tests drive the real gateway and session code
//! end to end without a real appliance.

#![allow(dead_code)]

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use lockbox_cli::notify::ViewSink;
use lockbox_cli::session::RunningStatus;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// One canned reply.
#[derive(Clone)]
pub enum StubReply {
    /// Served as `200 OK` with a JSON body.
    Json(Value),
    /// Raw status and bytes, for the binary endpoints and for malformed
    /// reply experiments.
    Raw(u16, Vec<u8>),
}

#[derive(Default)]
struct Route {
    queue: VecDeque<StubReply>,
    /// Served when the queue is empty; replays forever.
    fallback: Option<StubReply>,
}

/// A request the stub has seen.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[derive(Default)]
struct StubState {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<Recorded>>,
}

/// In-process appliance double listening on a loopback port.
pub struct StubAppliance {
    pub base_url: String,
    state: Arc<StubState>,
}

impl StubAppliance {
    pub async fn start() -> StubAppliance {
        let state = Arc::new(StubState::default());
        let router = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub appliance");
        let addr = listener.local_addr().expect("stub address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        StubAppliance {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    /// Queues one reply for `path`; consumed in FIFO order before the
    /// route's fallback.
    pub fn enqueue(&self, path: &str, reply: StubReply) {
        let mut routes = self.state.routes.lock().unwrap();
        routes.entry(path.to_string()).or_default().queue.push_back(reply);
    }

    /// Sets the reply served whenever the queue for `path` is empty.
    pub fn set_fallback(&self, path: &str, reply: StubReply) {
        let mut routes = self.state.routes.lock().unwrap();
        routes.entry(path.to_string()).or_default().fallback = Some(reply);
    }

    /// Queues a `{"status": .., "response": ..}` envelope.
    pub fn enqueue_envelope(&self, path: &str, status: &str, response: Value) {
        self.enqueue(
            path,
            StubReply::Json(json!({"status": status, "response": response})),
        );
    }

    pub fn set_envelope_fallback(&self, path: &str, status: &str, response: Value) {
        self.set_fallback(
            path,
            StubReply::Json(json!({"status": status, "response": response})),
        );
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn handle(State(state): State<Arc<StubState>>, req: Request) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_ascii_lowercase(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = to_bytes(req.into_body(), usize::MAX)
        .await
        .unwrap_or_default()
        .to_vec();

    state.requests.lock().unwrap().push(Recorded {
        method,
        path: path.clone(),
        query,
        headers,
        body,
    });

    let reply = {
        let mut routes = state.routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(route) => route.queue.pop_front().or_else(|| route.fallback.clone()),
            None => None,
        }
    };

    match reply {
        Some(StubReply::Json(body)) => axum::Json(body).into_response(),
        Some(StubReply::Raw(status, bytes)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            bytes,
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({"status": "KO", "response": format!("no stub route for {path}")})),
        )
            .into_response(),
    }
}

/// View collaborator that records every call it receives.
#[derive(Default)]
pub struct RecordingView {
    calls: Mutex<Vec<String>>,
    statuses: Mutex<Vec<RunningStatus>>,
}

impl RecordingView {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<RunningStatus> {
        self.statuses.lock().unwrap().clone()
    }

    fn push(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl ViewSink for RecordingView {
    fn error_dialog_opened(&self, messages: &[String]) {
        self.push(format!("open:{}", messages.join("|")));
    }

    fn error_dialog_appended(&self, message: &str) {
        self.push(format!("append:{message}"));
    }

    fn show_login(&self) {
        self.push("login");
    }

    fn show_browser(&self) {
        self.push("browser");
    }

    fn announce_shutdown(&self) {
        self.push("shutdown");
    }

    fn render_status(&self, status: &RunningStatus) {
        self.push("status");
        self.statuses.lock().unwrap().push(status.clone());
    }
}
