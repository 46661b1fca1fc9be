//! Appliance status poller
//!
//! One self-rescheduling loop per session: polls `status/running`, hands
//! the decoded status to the view, and watches the appliance log for
//! completion markers that should refresh the file listing. The next
//! cycle is scheduled only after the previous one finished, so at most
//! one status request is ever in flight.

use crate::gateway::{ApiMethod, Gateway, GatewayError, Verb};
use crate::notify::{RefreshHook, ViewSink};
use crate::session::{EventBus, SessionContext};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay between poll cycles.
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Appliance log lines matching this mark a finished asynchronous job.
static COMPLETION_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new("completed|generated").unwrap());

/// One entry of the appliance status log or notification feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusEntry {
    pub epoch: i64,
    /// Syslog-style severity number.
    pub code: i32,
    pub msg: String,
}

/// Decoded `status/running` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunningStatus {
    pub uptime: i64,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
    pub freeram: u64,
    #[serde(default)]
    pub log: Vec<StatusEntry>,
    #[serde(default)]
    pub notification: Vec<StatusEntry>,
}

pub struct StatusPoller {
    gateway: Arc<Gateway>,
    session: SessionContext,
    bus: EventBus,
    view: Arc<dyn ViewSink>,
    refresh: Option<RefreshHook>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(
        gateway: Arc<Gateway>,
        session: SessionContext,
        bus: EventBus,
        view: Arc<dyn ViewSink>,
        refresh: Option<RefreshHook>,
        interval: Duration,
    ) -> StatusPoller {
        StatusPoller {
            gateway,
            session,
            bus,
            view,
            refresh,
            interval,
        }
    }

    /// Runs until the session token disappears or the session generation
    /// moves past the one captured at spawn.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let generation = self.session.generation();
        loop {
            if self.session.generation() != generation || self.session.token().is_none() {
                tracing::debug!(target: "lockbox::session", "status poller retired");
                return;
            }
            if let Err(err) = self.poll_once().await {
                self.bus.report("session.status", &err);
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn poll_once(&self) -> Result<(), GatewayError> {
        let payload = self
            .gateway
            .call(ApiMethod::StatusRunning, Verb::Post, None)
            .await?;
        let status: RunningStatus = serde_json::from_value(payload)
            .map_err(|e| GatewayError::malformed("running status", e))?;

        for entry in &status.log {
            if COMPLETION_MARKER.is_match(&entry.msg)
                && self.session.advance_watermark(entry.epoch)
            {
                if let Some(refresh) = &self.refresh {
                    refresh();
                }
            }
        }

        self.view.render_status(&status);
        Ok(())
    }
}
