// Session management
//
// `session.create` with the anonymous SID yields the SID every later call
// carries; `session.destroy` ends it on the device.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use crate::client::DeviceClient;
use crate::envelope::{ANONYMOUS_SID, RpcOutcome, RpcRequest, interpret};
use crate::error::Error;

impl DeviceClient {
    /// Return the held SID, logging in first if there is none.
    ///
    /// Idempotent: once a SID is held this performs no network activity.
    pub async fn ensure_authenticated(&self) -> Result<SecretString, Error> {
        match self.current_sid() {
            Some(sid) => Ok(sid),
            None => self.authenticate().await,
        }
    }

    /// Log in unconditionally and replace the held SID.
    ///
    /// `POST /rpc` with `session.create {user, password}` under the
    /// anonymous SID. The SID is read from `result[1].sid`; a rejection or
    /// any other reply shape is [`Error::Authentication`].
    pub async fn authenticate(&self) -> Result<SecretString, Error> {
        debug!(user = %self.username(), "creating session");

        let params = json!({
            "user": self.username(),
            "password": self.password().expose_secret(),
        });
        let request = RpcRequest::call(ANONYMOUS_SID, "session", "create", &params);
        let response = self.transport().send(&request).await?;

        let sid = extract_sid(&response)?;
        self.store_sid(Some(sid.clone()));

        debug!("session established");
        Ok(sid)
    }

    /// End the session on the device (`session.destroy`).
    ///
    /// The local SID is kept, so a call made after logout is sent with the
    /// destroyed SID and fails; use [`clear_session`](Self::clear_session)
    /// to make the next call log in again. Without a held SID there is
    /// nothing to destroy and no request is sent.
    pub async fn logout(&self) -> Result<(), Error> {
        if self.current_sid().is_none() {
            debug!("logout without a session, nothing to do");
            return Ok(());
        }
        debug!("destroying session");
        self.call("session", "destroy", &json!({})).await?;
        Ok(())
    }

    /// Whether a SID is currently held.
    pub fn has_session(&self) -> bool {
        self.current_sid().is_some()
    }

    /// Forget the held SID so the next call logs in again.
    ///
    /// Purely local; the device is not told. Typical after a reboot, when
    /// the old SID is gone device-side.
    pub fn clear_session(&self) {
        debug!("clearing session");
        self.store_sid(None);
    }
}

fn extract_sid(response: &Value) -> Result<SecretString, Error> {
    let payload = match interpret(response) {
        RpcOutcome::Success(payload) => payload,
        RpcOutcome::Failure { code } => {
            return Err(Error::Authentication {
                message: format!(
                    "session.create rejected (status {code:?}), check username/password"
                ),
            });
        }
    };

    match payload.get("sid").and_then(Value::as_str) {
        Some(sid) if !sid.is_empty() => Ok(SecretString::from(sid.to_owned())),
        _ => Err(Error::Authentication {
            message: "no session id in session.create reply, check username/password".into(),
        }),
    }
}
