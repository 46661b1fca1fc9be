//! Bootstrap and module-graph integration tests

mod support;

use lockbox_cli::app::App;
use lockbox_cli::config::Config;
use lockbox_cli::modules::{join, Module, ModuleLoader};
use lockbox_cli::notify::ViewSink;
use lockbox_cli::session::{EventBus, SessionContext};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::{RecordingView, StubAppliance};
use tokio::time::timeout;

fn stub_config(stub: &StubAppliance) -> Config {
    let mut config = Config::default();
    config.server.url = stub.base_url.clone();
    config.status.poll_interval_ms = 50;
    config
}

#[tokio::test]
async fn bootstrap_loads_the_whole_graph() {
    let stub = StubAppliance::start().await;
    // Fresh process: no cookie, refresh is rejected.
    stub.set_envelope_fallback("/api/auth/refresh", "INVALID_SESSION", json!("no session"));

    let view = Arc::new(RecordingView::default());
    let config = stub_config(&stub);
    let app = App::bootstrap(&config, view.clone() as Arc<dyn ViewSink>).expect("bootstrap");

    timeout(Duration::from_secs(2), app.started())
        .await
        .expect("the module graph must resolve");

    assert!(app.modules.ui.get().is_some());
    assert!(app.modules.backend.get().is_some());
    assert!(app.modules.session.get().is_some());
    assert!(app.modules.keyring.get().is_some());
    assert!(app.modules.luks.get().is_some());
    assert!(app.modules.clock.get().is_some());
    assert!(app.modules.messaging.get().is_some());
    assert!(app.modules.files.get().is_some());

    let events = app.bus.log_events();
    assert!(
        events
            .iter()
            .any(|e| e.msg.contains("application modules loaded")),
        "bootstrap must announce the loaded graph"
    );

    // The rejected refresh landed on the login view without a dialog.
    assert!(view.calls().contains(&"login".to_string()));
    assert!(!app.bus.dialog_open());
    assert!(!app.session.has_session());
}

#[tokio::test]
async fn bootstrap_refuses_an_unparseable_appliance_url() {
    let mut config = Config::default();
    config.server.url = "not a url".to_string();
    let view = Arc::new(RecordingView::default());
    assert!(App::bootstrap(&config, view as Arc<dyn ViewSink>).is_err());
}

#[tokio::test]
async fn login_through_the_graph_syncs_the_appliance_clock() {
    let stub = StubAppliance::start().await;
    stub.set_envelope_fallback("/api/auth/refresh", "INVALID_SESSION", json!("no session"));
    stub.enqueue_envelope(
        "/api/auth/login",
        "OK",
        json!({"XSRFToken": "tok", "volume": "vol0"}),
    );
    stub.set_envelope_fallback(
        "/api/status/version",
        "OK",
        json!({"revision": "r1", "build": "b1", "key_path": "keys"}),
    );
    stub.set_envelope_fallback(
        "/api/status/running",
        "OK",
        json!({"uptime": 1, "load_1": 0.0, "load_5": 0.0, "load_15": 0.0,
               "freeram": 1, "log": [], "notification": []}),
    );
    stub.set_envelope_fallback("/api/config/time", "OK", json!(null));

    let view = Arc::new(RecordingView::default());
    let app = App::bootstrap(&stub_config(&stub), view.clone() as Arc<dyn ViewSink>)
        .expect("bootstrap");
    app.started().await;

    let manager = app.modules.session.ready().await;
    manager.login("vol0", "pw", false).await.expect("login");
    assert!(view.calls().contains(&"browser".to_string()));

    // The session-opened hook pushes the client time to the appliance.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let synced = stub.requests_for("/api/config/time");
    assert_eq!(synced.len(), 1);
    let body = synced[0].json().expect("json body");
    assert!(body.get("epoch").and_then(|e| e.as_i64()).unwrap_or(0) > 0);
}

#[tokio::test]
async fn a_failed_module_parks_its_dependents_with_a_critical_event() {
    let session = SessionContext::new();
    let bus = EventBus::new(session);
    let loader = ModuleLoader::new(bus.clone());

    let base: Module<&'static str> = Module::declare("base");
    let middle: Module<&'static str> = Module::declare("middle");
    let leaf: Module<&'static str> = Module::declare("leaf");

    loader.load(&middle, vec![base.readiness()], async { Ok("middle") });
    loader.load(
        &leaf,
        vec![join(vec![base.readiness(), middle.readiness()])],
        async { Ok("leaf") },
    );
    loader.load(&base, Vec::new(), async {
        Err(anyhow::anyhow!("script fetch failed"))
    });

    assert!(timeout(Duration::from_millis(100), leaf.ready()).await.is_err());
    assert!(timeout(Duration::from_millis(100), middle.ready()).await.is_err());
    assert!(base.get().is_none() && middle.get().is_none() && leaf.get().is_none());

    let events = bus.log_events();
    assert_eq!(events.len(), 1);
    assert!(events[0].msg.contains("[modules.base]"));
    assert!(events[0].msg.contains("script fetch failed"));
}
