// HTTP transport for the device's JSON-RPC endpoint.
//
// Builds the `reqwest::Client` (TLS policy, timeout) and performs the single
// POST-and-decode step every RPC goes through. No protocol semantics live
// here: the `result` array is interpreted one layer up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::Error;

/// Default per-request timeout. Firmware uploads and settings exports can
/// keep the device busy for a long time before it answers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// TLS verification mode.
///
/// **The default is [`DangerAcceptInvalid`](Self::DangerAcceptInvalid).**
/// Devices ship with self-signed certificates, so certificate verification
/// is off unless the caller opts in with [`System`](Self::System) or
/// [`CustomCa`](Self::CustomCa). Anyone on the network path can
/// impersonate the device under the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (self-signed devices).
    #[default]
    DangerAcceptInvalid,
}

/// Transport configuration for building the HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config. Warns when certificate
    /// verification is off.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("adsrpc/", env!("CARGO_PKG_VERSION")));

        let builder = match &self.tls {
            TlsMode::System => builder,
            TlsMode::CustomCa(path) => builder.add_root_certificate(load_ca(path)?),
            TlsMode::DangerAcceptInvalid => {
                warn!("device certificate verification disabled");
                builder.danger_accept_invalid_certs(true)
            }
        };

        builder
            .build()
            .map_err(|e| Error::Tls(format!("cannot set up device HTTP client: {e}")))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }
}

fn load_ca(path: &Path) -> Result<reqwest::Certificate, Error> {
    let pem = std::fs::read(path)
        .map_err(|e| Error::Tls(format!("CA certificate {}: {e}", path.display())))?;
    reqwest::Certificate::from_pem(&pem)
        .map_err(|e| Error::Tls(format!("CA certificate {} is not PEM: {e}", path.display())))
}

/// POSTs JSON-RPC envelopes to `{base}/rpc` and decodes the reply.
#[derive(Debug, Clone)]
pub(crate) struct RpcTransport {
    http: reqwest::Client,
    rpc_url: Url,
}

impl RpcTransport {
    pub(crate) fn new(http: reqwest::Client, base_url: &Url) -> Result<Self, Error> {
        let rpc_url = base_url.join("rpc")?;
        Ok(Self { http, rpc_url })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Send one request. Exactly one attempt; no retry.
    pub(crate) async fn send(
        &self,
        payload: &(impl Serialize + Sync),
    ) -> Result<serde_json::Value, Error> {
        debug!("POST {}", self.rpc_url);

        let resp = self
            .http
            .post(self.rpc_url.clone())
            .json(payload)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let body = resp.text().await?;
        trace!(len = body.len(), "rpc response received");

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body,
        })
    }
}

/// Turn an HTTP error status (>= 400) into [`Error::HttpStatus`].
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_client_error() || status.is_server_error() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            body: preview(&body).to_owned(),
        });
    }
    Ok(resp)
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
