//! The only HTTP path to the appliance
//!
//! Builds requests against the endpoint table, attaches the anti-forgery
//! header, and forces every JSON reply through the envelope gate before a
//! payload can reach a caller. The binary upload/download endpoints skip
//! the envelope but share the same error taxonomy.

pub mod api;
pub mod envelope;
pub mod error;

pub use api::{ApiMethod, Verb, API_PREFIX};
pub use envelope::{Envelope, EnvelopeError, Status};
pub use error::GatewayError;

use crate::config::ServerConfig;
use crate::session::{EventBus, SessionContext};
use anyhow::Context;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Anti-forgery header attached to every authenticated exchange.
pub const XSRF_HEADER: &str = "X-XSRFToken";
/// Destination path header for raw uploads, percent-encoded.
pub const UPLOAD_FILENAME_HEADER: &str = "X-UploadFilename";
/// Overwrite flag header for raw uploads.
pub const FORCE_OVERWRITE_HEADER: &str = "X-ForceOverwrite";

/// The JSON/HTTP channel to the appliance.
pub struct Gateway {
    http: Client,
    base: Url,
    request_timeout: Duration,
    session: SessionContext,
    bus: EventBus,
}

impl Gateway {
    pub fn new(
        server: &ServerConfig,
        session: SessionContext,
        bus: EventBus,
    ) -> anyhow::Result<Gateway> {
        let base = Url::parse(&server.url)
            .with_context(|| format!("invalid appliance URL {:?}", server.url))?;
        let http = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(server.accept_invalid_certs)
            .build()
            .context("building HTTP client")?;

        Ok(Gateway {
            http,
            base,
            request_timeout: Duration::from_secs(server.request_timeout_secs),
            session,
            bus,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, method: ApiMethod) -> Url {
        let mut url = self.base.clone();
        url.set_path(&format!("{API_PREFIX}{}", method.path()));
        url
    }

    /// Performs one enveloped exchange. `Ok` carries the `response`
    /// payload of an `OK` envelope; every other outcome is an error.
    pub async fn call(
        &self,
        method: ApiMethod,
        verb: Verb,
        body: Option<Value>,
    ) -> Result<Value, GatewayError> {
        let url = self.endpoint(method);
        let mut req = match verb {
            Verb::Get => self.http.get(url),
            Verb::Post => self.http.post(url),
        };
        req = req
            .timeout(self.request_timeout)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.session.token() {
            req = req.header(XSRF_HEADER, token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let reply = req.send().await.map_err(GatewayError::from_network_error)?;
        let body: Value = reply
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("unreadable reply: {e}")))?;

        let envelope = Envelope::parse(body)?;
        match envelope.status {
            Status::Ok => Ok(envelope.response),
            status => Err(GatewayError::rejected(status, &envelope.response)),
        }
    }

    /// Callback form of [`Gateway::call`]: `on_success` receives the
    /// payload and the threaded `context`; failures are reported on the
    /// event bus. An envelope violation invokes no callback at all.
    pub async fn dispatch<C, S>(
        &self,
        source: &str,
        method: ApiMethod,
        verb: Verb,
        body: Option<Value>,
        context: C,
        on_success: S,
    ) where
        C: Send,
        S: FnOnce(Value, C) + Send,
    {
        self.dispatch_or(source, method, verb, body, context, on_success, |_| {})
            .await;
    }

    /// Like [`Gateway::dispatch`] with a failure continuation, invoked on
    /// rejections and transport faults but never on envelope violations.
    #[allow(clippy::too_many_arguments)]
    pub async fn dispatch_or<C, S, F>(
        &self,
        source: &str,
        method: ApiMethod,
        verb: Verb,
        body: Option<Value>,
        context: C,
        on_success: S,
        on_failure: F,
    ) where
        C: Send,
        S: FnOnce(Value, C) + Send,
        F: FnOnce(C) + Send,
    {
        match self.call(method, verb, body).await {
            Ok(payload) => on_success(payload, context),
            Err(err) => {
                self.bus.report(source, &err);
                if !matches!(err, GatewayError::Envelope(_)) {
                    on_failure(context);
                }
            }
        }
    }

    /// Raw-body upload. Not an envelope endpoint: success is the HTTP
    /// status, failures arrive as plain text bodies.
    pub async fn upload(
        &self,
        dest: &str,
        overwrite: bool,
        body: Vec<u8>,
    ) -> Result<(), GatewayError> {
        let url = self.endpoint(ApiMethod::FileUpload);
        let mut req = self
            .http
            .post(url)
            .header(UPLOAD_FILENAME_HEADER, encode_upload_path(dest))
            .header(FORCE_OVERWRITE_HEADER, if overwrite { "true" } else { "false" })
            .body(body);
        if let Some(token) = self.session.token() {
            req = req.header(XSRF_HEADER, token);
        }

        let reply = req.send().await.map_err(GatewayError::from_network_error)?;
        if reply.status().is_success() {
            return Ok(());
        }
        let status = reply.status();
        let text = reply.text().await.unwrap_or_default();
        Err(GatewayError::Transport(format!(
            "upload rejected ({status}): {text}"
        )))
    }

    /// Fetches the byte stream for a download id obtained through
    /// `file/download`. The id is the entire handshake; no XSRF header.
    pub async fn download_stream(&self, id: &str) -> Result<Response, GatewayError> {
        let mut url = self.endpoint(ApiMethod::FileDownload);
        url.query_pairs_mut().append_pair("id", id);

        let reply = self
            .http
            .get(url)
            .send()
            .await
            .map_err(GatewayError::from_network_error)?;
        if !reply.status().is_success() {
            let status = reply.status();
            let text = reply.text().await.unwrap_or_default();
            return Err(GatewayError::Transport(format!(
                "download rejected ({status}): {text}"
            )));
        }
        Ok(reply)
    }
}

/// Percent-encodes an upload destination so the header survives
/// non-US-ASCII path components.
fn encode_upload_path(path: &str) -> String {
    url::form_urlencoded::byte_serialize(path.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gateway(url: &str) -> Gateway {
        let server = ServerConfig {
            url: url.to_string(),
            accept_invalid_certs: true,
            request_timeout_secs: 5,
        };
        let session = SessionContext::new();
        let bus = EventBus::new(session.clone());
        Gateway::new(&server, session, bus).expect("gateway")
    }

    #[test]
    fn endpoints_live_under_the_api_prefix() {
        let gateway = test_gateway("https://10.0.0.1:4430");
        assert_eq!(
            gateway.endpoint(ApiMethod::FileList).as_str(),
            "https://10.0.0.1:4430/api/file/list"
        );
        assert_eq!(
            gateway.endpoint(ApiMethod::AuthRefresh).as_str(),
            "https://10.0.0.1:4430/api/auth/refresh"
        );
    }

    #[test]
    fn rejects_unparseable_base_urls() {
        let server = ServerConfig {
            url: "not a url".to_string(),
            ..ServerConfig::default()
        };
        let session = SessionContext::new();
        let bus = EventBus::new(session.clone());
        assert!(Gateway::new(&server, session, bus).is_err());
    }

    #[test]
    fn upload_paths_are_query_encoded() {
        assert_eq!(encode_upload_path("/top/plain.txt"), "%2Ftop%2Fplain.txt");
        assert_eq!(encode_upload_path("/top/с отчётом"), "%2Ftop%2F%D1%81+%D0%BE%D1%82%D1%87%D1%91%D1%82%D0%BE%D0%BC");
    }
}
