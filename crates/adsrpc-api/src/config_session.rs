// Configuration transactions and read-only queries
//
// Mutations (`set`, `table_set`, `table_up`, `table_del`) are staged under a
// configuration session id and only take effect on `sess_commit`. The
// device offers no abort: an opened session is expected to be committed.

use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::client::DeviceClient;
use crate::error::Error;

/// Identifier of an open configuration session.
///
/// Returned by [`DeviceClient::sess_start`] and consumed by
/// [`DeviceClient::sess_commit`], so a committed id cannot be used again.
/// Not `Clone` for the same reason.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CfgSessionId(String);

impl CfgSessionId {
    /// Wrap an id obtained elsewhere (e.g. another process that opened it).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CfgSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Named-parameter shapes ───────────────────────────────────────────

#[derive(Serialize)]
struct SessionParams<'a> {
    cfg_session_id: &'a CfgSessionId,
}

#[derive(Serialize)]
struct SetParams<'a, V> {
    cfg_session_id: &'a CfgSessionId,
    values: &'a V,
    verbose: bool,
}

#[derive(Serialize)]
struct TableSetParams<'a> {
    tablename: &'a str,
    cfg_session_id: &'a CfgSessionId,
    row: Vec<&'a str>,
}

#[derive(Serialize)]
struct TableUpParams<'a, C, V> {
    tablename: &'a str,
    cfg_session_id: &'a CfgSessionId,
    condition: &'a C,
    values: &'a V,
}

#[derive(Serialize)]
struct TableDelParams<'a, C> {
    tablename: &'a str,
    cfg_session_id: &'a CfgSessionId,
    condition: &'a C,
}

#[derive(Serialize)]
struct StatusParams<'a> {
    function: &'a str,
    parameters: [&'a str; 2],
}

impl DeviceClient {
    // ── Session lifecycle ────────────────────────────────────────────

    /// Open a configuration session (`config.sess_start`).
    ///
    /// Do not open a second session before committing the first; the
    /// device's behaviour for overlapping sessions is undefined.
    pub async fn sess_start(&self) -> Result<CfgSessionId, Error> {
        let payload = self.call("config", "sess_start", &json!({})).await?;
        let id = match payload.get("cfg_session_id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(Error::Deserialization {
                    message: "config.sess_start reply has no cfg_session_id".into(),
                    body: payload.to_string(),
                });
            }
        };
        debug!(cfg_session_id = %id, "configuration session opened");
        Ok(CfgSessionId(id))
    }

    /// Commit every mutation staged under `id` (`config.sess_commit`).
    pub async fn sess_commit(&self, id: CfgSessionId) -> Result<Value, Error> {
        debug!(cfg_session_id = %id, "committing configuration session");
        self.call(
            "config",
            "sess_commit",
            &SessionParams {
                cfg_session_id: &id,
            },
        )
        .await
    }

    // ── Staged mutations ─────────────────────────────────────────────

    /// Stage scalar configuration values (`config.set`).
    ///
    /// Always sent with `verbose: true` so the device reports which value
    /// failed validation.
    pub async fn config_set(
        &self,
        id: &CfgSessionId,
        values: &(impl Serialize + Sync),
    ) -> Result<Value, Error> {
        debug!(cfg_session_id = %id, "staging config values");
        self.call(
            "config",
            "set",
            &SetParams {
                cfg_session_id: id,
                values,
                verbose: true,
            },
        )
        .await
    }

    /// Stage a new row in `tablename` (`config.table_set`).
    ///
    /// Fields are positional and defined by the device's table; pass `""`
    /// for an id column the device assigns.
    pub async fn table_insert(
        &self,
        tablename: &str,
        id: &CfgSessionId,
        row: &[impl AsRef<str>],
    ) -> Result<Value, Error> {
        debug!(tablename, cfg_session_id = %id, fields = row.len(), "staging row insert");
        self.call(
            "config",
            "table_set",
            &TableSetParams {
                tablename,
                cfg_session_id: id,
                row: row.iter().map(AsRef::as_ref).collect(),
            },
        )
        .await
    }

    /// Stage an update of the rows matching `condition` (`config.table_up`).
    pub async fn table_up(
        &self,
        tablename: &str,
        id: &CfgSessionId,
        condition: &(impl Serialize + Sync),
        values: &(impl Serialize + Sync),
    ) -> Result<Value, Error> {
        debug!(tablename, cfg_session_id = %id, "staging row update");
        self.call(
            "config",
            "table_up",
            &TableUpParams {
                tablename,
                cfg_session_id: id,
                condition,
                values,
            },
        )
        .await
    }

    /// Stage deletion of the rows matching `condition` (`config.table_del`).
    ///
    /// Dependencies between tables (e.g. deactivating a ruleset before
    /// deleting it) are not checked here; order the calls accordingly.
    pub async fn table_del(
        &self,
        tablename: &str,
        id: &CfgSessionId,
        condition: &(impl Serialize + Sync),
    ) -> Result<Value, Error> {
        debug!(tablename, cfg_session_id = %id, "staging row delete");
        self.call(
            "config",
            "table_del",
            &TableDelParams {
                tablename,
                cfg_session_id: id,
                condition,
            },
        )
        .await
    }

    /// Open a session, set `values`, and commit.
    ///
    /// For several mutations in one transaction use [`sess_start`](Self::sess_start),
    /// the individual calls, then [`sess_commit`](Self::sess_commit). If
    /// `config_set` fails the session is left open, since the device has no
    /// abort.
    pub async fn config_set_commit(
        &self,
        values: &(impl Serialize + Sync),
    ) -> Result<Value, Error> {
        let id = self.sess_start().await?;
        self.config_set(&id, values).await?;
        self.sess_commit(id).await
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Look up rows of `tablename` where `key == value` (`config.table_get`).
    pub async fn table_get(
        &self,
        tablename: &str,
        key: &str,
        value: &str,
    ) -> Result<Value, Error> {
        let mut condition = serde_json::Map::new();
        condition.insert(key.to_owned(), Value::String(value.to_owned()));
        self.call(
            "config",
            "table_get",
            &json!({
                "tablename": tablename,
                "condition": condition,
            }),
        )
        .await
    }

    /// Read committed configuration values (`config.get`).
    pub async fn config_get(&self, keys: &[impl AsRef<str>]) -> Result<Value, Error> {
        let keys: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
        self.call("config", "get", &json!({ "keys": keys })).await
    }

    /// Export whole configuration pages (`config.export_pages`), e.g.
    /// `["FILTERCONF"]` for the complete packet filter.
    pub async fn export_pages(&self, pages: &[impl AsRef<str>]) -> Result<Value, Error> {
        let pages: Vec<&str> = pages.iter().map(AsRef::as_ref).collect();
        self.call("config", "export_pages", &json!({ "pages": pages })).await
    }

    /// Query one status property (`status.get`) without extra parameters.
    ///
    /// `Ok(None)` when the device's reply does not include `property`;
    /// some properties are only reported conditionally.
    pub async fn status(&self, property: &str) -> Result<Option<Value>, Error> {
        self.status_with_params(property, "", "").await
    }

    /// Query one status property with its two positional parameters,
    /// e.g. `status_with_params("print_cert", "server-cert.pem", "")`.
    pub async fn status_with_params(
        &self,
        property: &str,
        param1: &str,
        param2: &str,
    ) -> Result<Option<Value>, Error> {
        let payload = self
            .call(
                "status",
                "get",
                &StatusParams {
                    function: property,
                    parameters: [param1, param2],
                },
            )
            .await?;

        Ok(match payload {
            Value::Object(mut map) => map.remove(property),
            _ => None,
        })
    }
}
