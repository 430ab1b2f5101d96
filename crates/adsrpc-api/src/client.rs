// Device client
//
// Owns the transport, the credentials, and the SID slot. `call` is the single
// entry point that turns `(object, method, params)` into a payload; the
// session, configuration, status, and file modules are inherent methods in
// separate files layered on top of it.

use std::sync::{PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::envelope::{RpcOutcome, RpcRequest, interpret};
use crate::error::Error;
use crate::transport::{RpcTransport, TransportConfig};

/// Everything needed to talk to one device.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Device root, e.g. `https://192.168.0.254/`.
    pub base_url: Url,
    pub username: String,
    pub password: SecretString,
    pub transport: TransportConfig,
}

impl ClientConfig {
    /// Config for `https://{host}/` with the default transport
    /// (120 s timeout, certificate verification **disabled**).
    pub fn for_host(host: &str, username: &str, password: SecretString) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("https://{host}/"))?;
        Ok(Self {
            base_url,
            username: username.to_owned(),
            password,
            transport: TransportConfig::default(),
        })
    }
}

/// Client for one device's JSON-RPC management interface.
///
/// The session id (SID) is acquired lazily on the first call and reused for
/// every call after that. A SID the device has expired is not renewed
/// automatically: the next call fails and the caller decides whether to
/// [`clear_session`](Self::clear_session) and try again.
///
/// The protocol expects one request in flight at a time. The SID slot is
/// lock-guarded so the client can be shared, but two tasks racing on a fresh
/// client may both log in; use one client per worker instead.
#[derive(Debug)]
pub struct DeviceClient {
    transport: RpcTransport,
    base_url: Url,
    username: String,
    password: SecretString,
    sid: RwLock<Option<SecretString>>,
}

impl DeviceClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client from a [`ClientConfig`]. No network activity.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let http = config.transport.build_client()?;
        Self::with_client(http, config.base_url, config.username, config.password)
    }

    /// Shorthand for `DeviceClient::new(ClientConfig::for_host(..))`.
    pub fn for_host(host: &str, username: &str, password: SecretString) -> Result<Self, Error> {
        Self::new(ClientConfig::for_host(host, username, password)?)
    }

    /// Wrap a pre-built `reqwest::Client` (caller owns TLS and timeout).
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        username: String,
        password: SecretString,
    ) -> Result<Self, Error> {
        let transport = RpcTransport::new(http, &base_url)?;
        Ok(Self {
            transport,
            base_url,
            username,
            password,
            sid: RwLock::new(None),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// The device root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &SecretString {
        &self.password
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        self.transport.http()
    }

    pub(crate) fn transport(&self) -> &RpcTransport {
        &self.transport
    }

    // ── SID slot ─────────────────────────────────────────────────────

    pub(crate) fn current_sid(&self) -> Option<SecretString> {
        self.sid
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn store_sid(&self, sid: Option<SecretString>) {
        *self.sid.write().unwrap_or_else(PoisonError::into_inner) = sid;
    }

    // ── RPC ──────────────────────────────────────────────────────────

    /// Call `object.method` with named `params` and return the payload.
    ///
    /// `params` must serialize to a JSON object. Authenticates first if no
    /// SID is held. Returns `result[1]`, or `{}` when the device sent no
    /// payload; a non-zero `result[0]` becomes [`Error::ApiCall`] carrying
    /// the whole response.
    ///
    /// Only `result[0]` decides failure. A reply with a JSON-RPC `error`
    /// member but no `result` yields `Ok({})`, so for mutating calls confirm
    /// the effect with a read when it matters.
    pub async fn call(
        &self,
        object: &str,
        method: &str,
        params: &(impl Serialize + Sync),
    ) -> Result<Value, Error> {
        let params = named_params(params)?;
        let sid = self.ensure_authenticated().await?;

        debug!(object, method, "rpc call");
        let request = RpcRequest::call(sid.expose_secret(), object, method, &params);
        let response = self.transport.send(&request).await?;

        match interpret(&response) {
            RpcOutcome::Success(payload) => Ok(payload),
            RpcOutcome::Failure { code } => {
                warn!(object, method, ?code, "device rejected call");
                Err(Error::ApiCall { code, response })
            }
        }
    }

    /// [`call`](Self::call), then deserialize the payload into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        object: &str,
        method: &str,
        params: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        let payload = self.call(object, method, params).await?;
        serde_json::from_value(payload.clone()).map_err(|e| Error::Deserialization {
            message: format!("{object}.{method} payload: {e}"),
            body: payload.to_string(),
        })
    }
}

/// Serialize call parameters, insisting on a JSON object.
fn named_params(params: &impl Serialize) -> Result<Value, Error> {
    let value =
        serde_json::to_value(params).map_err(|e| Error::validation("params", e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(Error::validation(
            "params",
            format!("expected a JSON object of named parameters, got {value}"),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn for_host_uses_https_root() {
        let config =
            ClientConfig::for_host("192.168.0.254", "admin", "admin".to_string().into()).unwrap();
        assert_eq!(config.base_url.as_str(), "https://192.168.0.254/");
        assert_eq!(config.username, "admin");
    }

    #[test]
    fn named_params_must_be_an_object() {
        assert_eq!(named_params(&json!({ "a": 1 })).unwrap(), json!({ "a": 1 }));
        let err = named_params(&json!(["a"])).unwrap_err();
        assert!(err.is_validation(), "got {err:?}");
    }

    #[test]
    fn new_client_holds_no_session() {
        let client =
            DeviceClient::for_host("device.local", "admin", "admin".to_string().into()).unwrap();
        assert!(client.current_sid().is_none());
        assert_eq!(client.base_url().as_str(), "https://device.local/");
    }
}
