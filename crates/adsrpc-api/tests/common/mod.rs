#![allow(clippy::unwrap_used, dead_code)]
// Shared helpers for the wiremock-backed integration tests.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{Map, Value, json};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Match, Mock, MockServer, Request, Respond, ResponseTemplate};

use adsrpc_api::DeviceClient;

pub const SID: &str = "abc123";
pub const ANONYMOUS_SID: &str = "00000000000000000000000000000000";

// ── Setup ───────────────────────────────────────────────────────────

pub async fn setup() -> (MockServer, DeviceClient) {
    let server = MockServer::start().await;
    let client = client_for(&server);
    (server, client)
}

pub fn client_for(server: &MockServer) -> DeviceClient {
    let base_url = Url::parse(&server.uri()).unwrap();
    DeviceClient::with_client(
        reqwest::Client::new(),
        base_url,
        "admin".into(),
        "admin".to_string().into(),
    )
    .unwrap()
}

/// Mount a `session.create` mock answering with [`SID`].
pub async fn mount_login(server: &MockServer, expected_logins: u64) {
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(header("content-type", "application/json"))
        .and(
            rpc("session", "create")
                .with_sid(ANONYMOUS_SID)
                .with_params(json!({ "user": "admin", "password": "admin" })),
        )
        .respond_with(rpc_ok(json!({ "sid": SID })))
        .expect(expected_logins)
        .mount(server)
        .await;
}

// ── Responses ───────────────────────────────────────────────────────

pub fn rpc_ok(payload: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "req-1",
        "jsonrpc": "2.0",
        "result": [0, payload],
    }))
}

pub fn rpc_status(code: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "req-1",
        "jsonrpc": "2.0",
        "result": [code],
    }))
}

// ── Matchers ────────────────────────────────────────────────────────

/// Matches a JSON-RPC `call` envelope by object/method, optionally also by
/// SID and by the exact named params.
pub struct RpcCall {
    object: &'static str,
    method: &'static str,
    sid: Option<&'static str>,
    params: Option<Value>,
}

pub fn rpc(object: &'static str, method: &'static str) -> RpcCall {
    RpcCall {
        object,
        method,
        sid: None,
        params: None,
    }
}

impl RpcCall {
    pub fn with_sid(mut self, sid: &'static str) -> Self {
        self.sid = Some(sid);
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

impl Match for RpcCall {
    fn matches(&self, request: &Request) -> bool {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return false;
        };
        if body["jsonrpc"] != "2.0" || body["method"] != "call" || body["id"] != "req-1" {
            return false;
        }
        let params = &body["params"];
        params[1] == self.object
            && params[2] == self.method
            && self.sid.is_none_or(|sid| params[0] == sid)
            && self.params.as_ref().is_none_or(|p| &params[3] == p)
    }
}

/// Named params of the n-th recorded request.
pub async fn recorded_params(server: &MockServer, n: usize) -> Value {
    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[n].body).unwrap();
    body["params"][3].clone()
}

// ── Fake device ─────────────────────────────────────────────────────

/// A small stateful device: scalar settings and positional tables, with
/// writes staged per configuration session and applied only on commit.
pub struct FakeDevice {
    state: Mutex<DeviceState>,
}

#[derive(Default)]
struct DeviceState {
    settings: Map<String, Value>,
    columns: HashMap<String, Vec<String>>,
    tables: HashMap<String, Vec<Vec<String>>>,
    staged: HashMap<String, Vec<Value>>,
    next_session: u32,
    next_row_id: u32,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeviceState {
                next_row_id: 1,
                ..DeviceState::default()
            }),
        }
    }

    pub fn with_setting(self, key: &str, value: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .settings
            .insert(key.into(), value.into());
        self
    }

    pub fn with_table(self, name: &str, columns: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .columns
                .insert(name.into(), columns.iter().map(|c| (*c).to_owned()).collect());
            state.tables.insert(name.into(), Vec::new());
        }
        self
    }

    pub async fn mount(self, server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(self)
            .mount(server)
            .await;
    }
}

impl DeviceState {
    fn row_object(&self, table: &str, row: &[String]) -> Value {
        let columns = &self.columns[table];
        Value::Object(
            columns
                .iter()
                .cloned()
                .zip(row.iter().cloned().map(Value::String))
                .collect(),
        )
    }

    fn matches(&self, table: &str, row: &[String], condition: &Value) -> bool {
        let columns = &self.columns[table];
        condition.as_object().unwrap().iter().all(|(key, want)| {
            columns
                .iter()
                .position(|c| c == key)
                .is_some_and(|i| want.as_str() == Some(row[i].as_str()))
        })
    }

    fn apply(&mut self, op: &Value) {
        match op["op"].as_str().unwrap() {
            "set" => {
                for (key, value) in op["values"].as_object().unwrap() {
                    self.settings.insert(key.clone(), value.clone());
                }
            }
            "insert" => {
                let table = op["tablename"].as_str().unwrap().to_owned();
                let mut row: Vec<String> = op["row"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|f| f.as_str().unwrap().to_owned())
                    .collect();
                if row[0].is_empty() {
                    row[0] = self.next_row_id.to_string();
                    self.next_row_id += 1;
                }
                self.tables.get_mut(&table).unwrap().push(row);
            }
            "update" => {
                let table = op["tablename"].as_str().unwrap().to_owned();
                let columns = self.columns[&table].clone();
                let rows = self.tables[&table].clone();
                let updated = rows
                    .into_iter()
                    .map(|mut row| {
                        if self.matches(&table, &row, &op["condition"]) {
                            for (key, value) in op["values"].as_object().unwrap() {
                                if let Some(i) = columns.iter().position(|c| c == key) {
                                    row[i] = value.as_str().unwrap().to_owned();
                                }
                            }
                        }
                        row
                    })
                    .collect();
                self.tables.insert(table, updated);
            }
            "delete" => {
                let table = op["tablename"].as_str().unwrap().to_owned();
                let rows = self.tables[&table].clone();
                let kept = rows
                    .into_iter()
                    .filter(|row| !self.matches(&table, row, &op["condition"]))
                    .collect();
                self.tables.insert(table, kept);
            }
            other => panic!("unknown staged op {other}"),
        }
    }

    fn stage(&mut self, params: &Value, op: Value) -> Value {
        let id = params["cfg_session_id"].as_str().unwrap_or_default();
        match self.staged.get_mut(id) {
            Some(ops) => {
                ops.push(op);
                json!([0, {}])
            }
            None => json!([5]),
        }
    }

    fn handle(&mut self, object: &str, method: &str, params: &Value) -> Value {
        match (object, method) {
            ("config", "sess_start") => {
                self.next_session += 1;
                let id = format!("cfg-{}", self.next_session);
                self.staged.insert(id.clone(), Vec::new());
                json!([0, { "cfg_session_id": id }])
            }
            ("config", "sess_commit") => {
                let id = params["cfg_session_id"].as_str().unwrap_or_default();
                match self.staged.remove(id) {
                    Some(ops) => {
                        for op in &ops {
                            self.apply(op);
                        }
                        json!([0, {}])
                    }
                    None => json!([5]),
                }
            }
            ("config", "set") => {
                let op = json!({ "op": "set", "values": params["values"] });
                self.stage(params, op)
            }
            ("config", "table_set") => {
                let op = json!({
                    "op": "insert",
                    "tablename": params["tablename"],
                    "row": params["row"],
                });
                self.stage(params, op)
            }
            ("config", "table_up") => {
                let op = json!({
                    "op": "update",
                    "tablename": params["tablename"],
                    "condition": params["condition"],
                    "values": params["values"],
                });
                self.stage(params, op)
            }
            ("config", "table_del") => {
                let op = json!({
                    "op": "delete",
                    "tablename": params["tablename"],
                    "condition": params["condition"],
                });
                self.stage(params, op)
            }
            ("config", "table_get") => {
                let table = params["tablename"].as_str().unwrap();
                let found = self.tables[table]
                    .iter()
                    .find(|row| self.matches(table, row, &params["condition"]))
                    .map(|row| self.row_object(table, row));
                match found {
                    Some(row) => json!([0, row]),
                    None => json!([0, {}]),
                }
            }
            ("config", "get") => {
                let values: Map<String, Value> = params["keys"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .filter_map(|k| {
                        let k = k.as_str().unwrap();
                        self.settings.get(k).map(|v| (k.to_owned(), v.clone()))
                    })
                    .collect();
                json!([0, values])
            }
            ("status", "get") => {
                let function = params["function"].as_str().unwrap();
                match self.settings.get(function) {
                    Some(value) => json!([0, { function: value }]),
                    None => json!([0, {}]),
                }
            }
            _ => json!([3]),
        }
    }
}

impl Respond for FakeDevice {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let params = &body["params"];
        let sid = params[0].as_str().unwrap();
        let object = params[1].as_str().unwrap();
        let method = params[2].as_str().unwrap();

        let result = if (object, method) == ("session", "create") {
            json!([0, { "sid": SID }])
        } else if sid != SID {
            json!([6])
        } else {
            self.state.lock().unwrap().handle(object, method, &params[3])
        };

        ResponseTemplate::new(200).set_body_json(json!({
            "id": "req-1",
            "jsonrpc": "2.0",
            "result": result,
        }))
    }
}
