//! Gateway integration tests against the stub appliance

mod support;

use lockbox_cli::config::ServerConfig;
use lockbox_cli::files::Files;
use lockbox_cli::gateway::{
    ApiMethod, Envelope, EnvelopeError, Gateway, GatewayError, Status, Verb, XSRF_HEADER,
};
use lockbox_cli::session::{EventBus, SessionContext, Severity};
use proptest::prelude::*;
use serde_json::json;
use std::sync::{Arc, Mutex};
use support::{StubAppliance, StubReply};

fn wire(stub: &StubAppliance) -> (Arc<Gateway>, SessionContext, EventBus) {
    let server = ServerConfig {
        url: stub.base_url.clone(),
        accept_invalid_certs: false,
        request_timeout_secs: 5,
    };
    let session = SessionContext::new();
    let bus = EventBus::new(session.clone());
    let gateway = Gateway::new(&server, session.clone(), bus.clone()).expect("gateway");
    (Arc::new(gateway), session, bus)
}

#[tokio::test]
async fn ok_envelope_payload_reaches_the_caller() {
    let stub = StubAppliance::start().await;
    stub.enqueue_envelope("/api/status/version", "OK", json!({"revision": "r7"}));
    let (gateway, _session, _bus) = wire(&stub);

    let payload = gateway
        .call(ApiMethod::StatusVersion, Verb::Get, None)
        .await
        .expect("OK envelope");
    assert_eq!(payload, json!({"revision": "r7"}));

    let seen = stub.requests_for("/api/status/version");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "GET");
}

#[tokio::test]
async fn xsrf_header_follows_the_session_token() {
    let stub = StubAppliance::start().await;
    stub.set_envelope_fallback("/api/file/list", "OK", json!({"total_space": 1, "free_space": 1, "inodes": []}));
    let (gateway, session, _bus) = wire(&stub);

    let _ = gateway.call(ApiMethod::FileList, Verb::Post, None).await;
    session.begin("t0k3n".to_string(), "vol0".to_string());
    let _ = gateway.call(ApiMethod::FileList, Verb::Post, None).await;

    let seen = stub.requests_for("/api/file/list");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].header(XSRF_HEADER), None);
    assert_eq!(seen[1].header(XSRF_HEADER), Some("t0k3n"));
}

#[tokio::test]
async fn rejection_carries_the_status_and_message() {
    let stub = StubAppliance::start().await;
    stub.enqueue_envelope("/api/file/delete", "KO", json!("permission denied"));
    let (gateway, _session, _bus) = wire(&stub);

    let err = gateway
        .call(ApiMethod::FileDelete, Verb::Post, Some(json!({"path": ["/x"]})))
        .await
        .unwrap_err();
    match err {
        GatewayError::Rejected { status, message } => {
            assert_eq!(status, Status::Ko);
            assert_eq!(message, "permission denied");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn dispatch_threads_the_context_through_on_success() {
    let stub = StubAppliance::start().await;
    stub.enqueue_envelope("/api/config/time", "OK", json!(null));
    let (gateway, _session, _bus) = wire(&stub);

    let outcome: Arc<Mutex<Option<(serde_json::Value, serde_json::Value)>>> =
        Arc::new(Mutex::new(None));
    let seen = Arc::clone(&outcome);
    gateway
        .dispatch(
            "test.time",
            ApiMethod::ConfigTime,
            Verb::Post,
            Some(json!({"epoch": 1})),
            json!({"a": 1}),
            move |payload, context| {
                *seen.lock().unwrap() = Some((payload, context));
            },
        )
        .await;

    let outcome = outcome.lock().unwrap().take().expect("success callback ran");
    assert_eq!(outcome.0, json!(null));
    assert_eq!(outcome.1, json!({"a": 1}));
}

#[tokio::test]
async fn dispatch_never_runs_the_success_path_on_rejection() {
    let stub = StubAppliance::start().await;
    stub.enqueue_envelope("/api/file/mkdir", "INVALID", json!("bad path"));
    let (gateway, _session, bus) = wire(&stub);

    let succeeded = Arc::new(Mutex::new(false));
    let failed_with: Arc<Mutex<Option<serde_json::Value>>> = Arc::new(Mutex::new(None));
    {
        let succeeded = Arc::clone(&succeeded);
        let failed_with = Arc::clone(&failed_with);
        gateway
            .dispatch_or(
                "test.mkdir",
                ApiMethod::FileMkdir,
                Verb::Post,
                Some(json!({"path": ["/new dir"]})),
                json!({"a": 1}),
                move |_, _| *succeeded.lock().unwrap() = true,
                move |context| *failed_with.lock().unwrap() = Some(context),
            )
            .await;
    }

    assert!(!*succeeded.lock().unwrap());
    assert_eq!(
        failed_with.lock().unwrap().take(),
        Some(json!({"a": 1}))
    );
    // Rejection classified by its envelope status, INVALID is dialog-class.
    assert!(bus.dialog_open());
    assert_eq!(bus.dialog_messages(), vec!["bad path".to_string()]);
}

#[tokio::test]
async fn envelope_violations_invoke_no_callback_at_all() {
    let stub = StubAppliance::start().await;
    // status present, response key missing
    stub.enqueue(
        "/api/file/copy",
        StubReply::Json(json!({"status": "OK"})),
    );
    let (gateway, _session, bus) = wire(&stub);

    let touched = Arc::new(Mutex::new(Vec::<&str>::new()));
    {
        let on_ok = Arc::clone(&touched);
        let on_err = Arc::clone(&touched);
        gateway
            .dispatch_or(
                "test.copy",
                ApiMethod::FileCopy,
                Verb::Post,
                None,
                (),
                move |_, _| on_ok.lock().unwrap().push("success"),
                move |_| on_err.lock().unwrap().push("failure"),
            )
            .await;
    }

    assert!(touched.lock().unwrap().is_empty());
    let events = bus.log_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Critical);
    assert!(events[0].msg.contains("invalid backend response"));
}

#[tokio::test]
async fn unparseable_reply_bodies_are_transport_errors() {
    let stub = StubAppliance::start().await;
    stub.enqueue("/api/auth/logout", StubReply::Raw(200, b"not json".to_vec()));
    let (gateway, _session, _bus) = wire(&stub);

    let err = gateway
        .call(ApiMethod::AuthLogout, Verb::Post, None)
        .await
        .unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
}

#[tokio::test]
async fn upload_sends_the_raw_body_with_the_custom_headers() {
    let stub = StubAppliance::start().await;
    stub.enqueue("/api/file/upload", StubReply::Raw(200, Vec::new()));
    let (gateway, session, bus) = wire(&stub);
    session.begin("upl0ad".to_string(), "vol0".to_string());

    let dir = tempfile::tempdir().expect("tempdir");
    let local = dir.path().join("report.pdf");
    tokio::fs::write(&local, b"%PDF-1.4 payload").await.unwrap();

    let files = Files::new(gateway, bus);
    let size = files
        .upload(&local, "/top dir/report.pdf", true)
        .await
        .expect("upload");
    assert_eq!(size, 16);

    let seen = stub.requests_for("/api/file/upload");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].body, b"%PDF-1.4 payload");
    assert_eq!(seen[0].header("X-ForceOverwrite"), Some("true"));
    assert_eq!(seen[0].header(XSRF_HEADER), Some("upl0ad"));
    let dest = seen[0].header("X-UploadFilename").expect("filename header");
    assert!(!dest.contains(' '), "destination must be encoded: {dest:?}");
    assert!(dest.contains("report.pdf"));
}

#[tokio::test]
async fn download_handshakes_an_id_then_streams_the_bytes() {
    let stub = StubAppliance::start().await;
    stub.enqueue_envelope("/api/file/download", "OK", json!("one-time-id"));
    stub.enqueue(
        "/api/file/download",
        StubReply::Raw(200, b"file contents".to_vec()),
    );
    let (gateway, _session, bus) = wire(&stub);

    let dir = tempfile::tempdir().expect("tempdir");
    let local = dir.path().join("fetched.bin");
    let files = Files::new(gateway, bus);
    let size = files.download("/top/fetched.bin", &local).await.expect("download");
    assert_eq!(size, 13);
    assert_eq!(tokio::fs::read(&local).await.unwrap(), b"file contents");

    let seen = stub.requests_for("/api/file/download");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[1].method, "GET");
    assert_eq!(seen[1].query.as_deref(), Some("id=one-time-id"));
}

proptest! {
    #[test]
    fn statuses_outside_the_enum_never_pass_the_gate(raw in "[A-Za-z_]{1,16}") {
        prop_assume!(!matches!(raw.as_str(), "OK" | "KO" | "INVALID" | "INVALID_SESSION"));
        let parsed = Envelope::parse(json!({"status": raw, "response": null}));
        prop_assert!(matches!(parsed, Err(EnvelopeError::UnknownStatus(_))));
    }

    #[test]
    fn objects_without_both_fields_never_pass_the_gate(
        has_status in any::<bool>(),
        has_response in any::<bool>(),
    ) {
        prop_assume!(!(has_status && has_response));
        let mut body = serde_json::Map::new();
        if has_status {
            body.insert("status".to_string(), json!("OK"));
        }
        if has_response {
            body.insert("response".to_string(), json!("x"));
        }
        prop_assert!(Envelope::parse(serde_json::Value::Object(body)).is_err());
    }
}
