//! Session state, authentication, and the event substrate
//!
//! Everything that used to be ambient page state lives here in one
//! injected [`SessionContext`]: credentials, appliance version, the
//! async-operation watermark, and a generation counter that retires
//! stale pollers. [`SessionManager`] drives the auth operations and the
//! view transitions that follow them.

pub mod bus;
pub mod event;
pub mod log;
pub mod poller;

pub use bus::EventBus;
pub use event::{Event, EventKind, Severity};
pub use log::{EventLog, MAX_SESSION_EVENTS};
pub use poller::{RunningStatus, StatusEntry, StatusPoller, STATUS_POLL_INTERVAL};

use crate::gateway::{ApiMethod, Gateway, GatewayError, Verb};
use crate::notify::{RefreshHook, ViewSink};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

/// Version information reported by the appliance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplianceVersion {
    pub revision: String,
    pub build: String,
    pub key_path: String,
}

/// Credentials granted by `auth/login` and `auth/refresh`.
#[derive(Debug, Deserialize)]
struct SessionGrant {
    #[serde(rename = "XSRFToken")]
    xsrf_token: String,
    volume: String,
}

#[derive(Debug, Default)]
struct SessionState {
    xsrf_token: Option<String>,
    volume: Option<String>,
    version: Option<ApplianceVersion>,
    /// Highest status-log epoch already acted on.
    watermark: i64,
    /// Bumped on every begin/clear so stale pollers detect turnover.
    generation: u64,
}

/// Shared session state. One instance per application, injected into
/// every component that needs it and mutated only through these methods.
/// Never persisted.
#[derive(Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionContext {
    pub fn new() -> SessionContext {
        SessionContext::default()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().unwrap().xsrf_token.clone()
    }

    pub fn volume(&self) -> Option<String> {
        self.inner.read().unwrap().volume.clone()
    }

    pub fn version(&self) -> Option<ApplianceVersion> {
        self.inner.read().unwrap().version.clone()
    }

    pub fn set_version(&self, version: ApplianceVersion) {
        self.inner.write().unwrap().version = Some(version);
    }

    pub fn has_session(&self) -> bool {
        let state = self.inner.read().unwrap();
        state.xsrf_token.is_some() && state.volume.is_some()
    }

    /// Adopts new credentials; resets the watermark and bumps the
    /// generation so pollers of the previous session retire.
    pub fn begin(&self, token: String, volume: String) {
        let mut state = self.inner.write().unwrap();
        state.xsrf_token = Some(token);
        state.volume = Some(volume);
        state.watermark = 0;
        state.generation += 1;
    }

    /// Drops every piece of session state, version info included.
    pub fn clear(&self) {
        let mut state = self.inner.write().unwrap();
        let generation = state.generation + 1;
        *state = SessionState {
            generation,
            ..SessionState::default()
        };
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().unwrap().generation
    }

    pub fn watermark(&self) -> i64 {
        self.inner.read().unwrap().watermark
    }

    /// Advances the completion watermark. True only when `epoch` is new.
    pub fn advance_watermark(&self, epoch: i64) -> bool {
        let mut state = self.inner.write().unwrap();
        if epoch > state.watermark {
            state.watermark = epoch;
            true
        } else {
            false
        }
    }
}

/// Authentication operations and session lifecycle.
pub struct SessionManager {
    gateway: Arc<Gateway>,
    session: SessionContext,
    bus: EventBus,
    view: Arc<dyn ViewSink>,
    poll_interval: Duration,
    refresh_hook: OnceLock<RefreshHook>,
    opened_hook: OnceLock<RefreshHook>,
}

impl SessionManager {
    pub fn new(
        gateway: Arc<Gateway>,
        session: SessionContext,
        bus: EventBus,
        view: Arc<dyn ViewSink>,
        poll_interval: Duration,
    ) -> SessionManager {
        SessionManager {
            gateway,
            session,
            bus,
            view,
            poll_interval,
            refresh_hook: OnceLock::new(),
            opened_hook: OnceLock::new(),
        }
    }

    /// Registers the file-listing refresh trigger the poller fires on
    /// completion markers. First registration wins.
    pub fn set_refresh_hook(&self, hook: RefreshHook) {
        let _ = self.refresh_hook.set(hook);
    }

    /// Registers the trigger fired after a session opens (clock sync).
    pub fn set_opened_hook(&self, hook: RefreshHook) {
        let _ = self.opened_hook.set(hook);
    }

    /// Opens a session. `dispose` asks the appliance to destroy the
    /// password slot after unlocking.
    pub async fn login(
        &self,
        volume: &str,
        password: &str,
        dispose: bool,
    ) -> Result<(), GatewayError> {
        let body = json!({"volume": volume, "password": password, "dispose": dispose});
        match self
            .gateway
            .call(ApiMethod::AuthLogin, Verb::Post, Some(body))
            .await
        {
            Ok(payload) => {
                let grant: SessionGrant = serde_json::from_value(payload)
                    .map_err(|e| GatewayError::malformed("login grant", e))?;
                self.adopt(grant).await;
                self.bus
                    .emit(EventKind::Info, "[session.login] opened a new session");
                Ok(())
            }
            Err(err) => {
                self.bus.report("session.login", &err);
                if !err.is_invalid_session() {
                    self.view.show_login();
                }
                Err(err)
            }
        }
    }

    /// Resumes a session from the appliance's cookie. An `OK` reply must
    /// carry both credentials; anything else ends whatever session state
    /// was left and lands on the login view.
    pub async fn refresh(&self) -> Result<(), GatewayError> {
        match self
            .gateway
            .call(ApiMethod::AuthRefresh, Verb::Get, None)
            .await
        {
            Ok(payload) => match serde_json::from_value::<SessionGrant>(payload) {
                Ok(grant) if !grant.xsrf_token.is_empty() && !grant.volume.is_empty() => {
                    self.adopt(grant).await;
                    Ok(())
                }
                _ => {
                    self.session.clear();
                    self.view.show_login();
                    self.bus.emit(
                        EventKind::Critical,
                        "[session.refresh] failed to refresh session, login required.",
                    );
                    Err(GatewayError::malformed(
                        "session grant",
                        "missing volume or token",
                    ))
                }
            },
            Err(err) => {
                if let GatewayError::Rejected { status, .. } = &err {
                    if !err.is_invalid_session() {
                        self.session.clear();
                        self.view.show_login();
                    }
                    // INVALID_SESSION reaches the same teardown through
                    // the bus classification
                    self.bus.emit(
                        EventKind::from_status(*status),
                        "[session.refresh] failed to refresh session, login required.",
                    );
                } else {
                    self.bus.report("session.refresh", &err);
                }
                Err(err)
            }
        }
    }

    /// Ends the session on both sides.
    pub async fn logout(&self) -> Result<(), GatewayError> {
        match self
            .gateway
            .call(ApiMethod::AuthLogout, Verb::Post, None)
            .await
        {
            Ok(_) => {
                self.session.clear();
                self.view.show_login();
                self.bus.emit(EventKind::Info, "[session.logout] session closed");
                Ok(())
            }
            Err(err) => {
                self.bus.report("session.logout", &err);
                Err(err)
            }
        }
    }

    /// Asks the appliance to power down.
    pub async fn poweroff(&self) -> Result<(), GatewayError> {
        match self
            .gateway
            .call(ApiMethod::AuthPoweroff, Verb::Post, None)
            .await
        {
            Ok(_) => {
                self.session.clear();
                self.view.announce_shutdown();
                self.bus
                    .emit(EventKind::Info, "[session.poweroff] device is shutting down");
                Ok(())
            }
            Err(err) => {
                self.bus.report("session.poweroff", &err);
                Err(err)
            }
        }
    }

    /// Post-restore step for a session that is already present: fetch
    /// the version info and start polling, without touching credentials.
    pub async fn resume(&self) {
        self.fetch_version().await;
        self.start_poller();
    }

    async fn adopt(&self, grant: SessionGrant) {
        self.session.begin(grant.xsrf_token, grant.volume);
        self.view.show_browser();
        self.fetch_version().await;
        self.start_poller();
        if let Some(hook) = self.opened_hook.get() {
            hook();
        }
    }

    async fn fetch_version(&self) {
        match self
            .gateway
            .call(ApiMethod::StatusVersion, Verb::Get, None)
            .await
        {
            Ok(payload) => match serde_json::from_value::<ApplianceVersion>(payload) {
                Ok(version) => self.session.set_version(version),
                Err(e) => self
                    .bus
                    .report("session.version", &GatewayError::malformed("version", e)),
            },
            Err(err) => self.bus.report("session.version", &err),
        }
    }

    fn start_poller(&self) {
        let poller = StatusPoller::new(
            Arc::clone(&self.gateway),
            self.session.clone(),
            self.bus.clone(),
            Arc::clone(&self.view),
            self.refresh_hook.get().cloned(),
            self.poll_interval,
        );
        let _ = poller.spawn();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_and_clear_move_the_generation() {
        let session = SessionContext::new();
        assert_eq!(session.generation(), 0);
        assert!(!session.has_session());

        session.begin("tok".to_string(), "vol".to_string());
        assert_eq!(session.generation(), 1);
        assert!(session.has_session());
        assert_eq!(session.token().as_deref(), Some("tok"));
        assert_eq!(session.volume().as_deref(), Some("vol"));

        session.clear();
        assert_eq!(session.generation(), 2);
        assert!(!session.has_session());
        assert!(session.version().is_none());
    }

    #[test]
    fn clear_drops_version_and_watermark() {
        let session = SessionContext::new();
        session.begin("tok".to_string(), "vol".to_string());
        session.set_version(ApplianceVersion {
            revision: "r1".to_string(),
            build: "2026-01-01".to_string(),
            key_path: "/keys".to_string(),
        });
        assert!(session.advance_watermark(40));
        session.clear();
        assert!(session.version().is_none());
        assert_eq!(session.watermark(), 0);
    }

    #[test]
    fn watermark_only_moves_forward() {
        let session = SessionContext::new();
        assert!(session.advance_watermark(10));
        assert!(!session.advance_watermark(10));
        assert!(!session.advance_watermark(3));
        assert!(session.advance_watermark(11));
        assert_eq!(session.watermark(), 11);
    }

    #[test]
    fn relogin_resets_the_watermark() {
        let session = SessionContext::new();
        session.begin("a".to_string(), "vol".to_string());
        assert!(session.advance_watermark(99));
        session.begin("b".to_string(), "vol".to_string());
        assert_eq!(session.watermark(), 0);
        assert!(session.advance_watermark(1));
    }

    #[test]
    fn grant_decodes_the_wire_field_names() {
        let grant: SessionGrant = serde_json::from_value(serde_json::json!({
            "XSRFToken": "t0k3n",
            "volume": "vault",
        }))
        .unwrap();
        assert_eq!(grant.xsrf_token, "t0k3n");
        assert_eq!(grant.volume, "vault");
    }
}
