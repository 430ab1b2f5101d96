// JSON-RPC envelope
//
// Every call is a JSON-RPC 2.0 `call` whose params are the positional
// quadruple `[sid, object, method, {named params}]`. Replies carry
// `result: [status, payload]`; status 0 is success.

use serde::Serialize;
use serde_json::Value;

/// SID sent before a session exists (32 zeroes).
pub const ANONYMOUS_SID: &str = "00000000000000000000000000000000";

const REQUEST_ID: &str = "req-1";
const JSONRPC_VERSION: &str = "2.0";

/// Outgoing request envelope.
///
/// ```json
/// {"id":"req-1","jsonrpc":"2.0","method":"call","params":[sid, object, method, {...}]}
/// ```
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    id: &'static str,
    jsonrpc: &'static str,
    method: &'static str,
    params: (&'a str, &'a str, &'a str, &'a Value),
}

impl<'a> RpcRequest<'a> {
    pub fn call(sid: &'a str, object: &'a str, method: &'a str, params: &'a Value) -> Self {
        Self {
            id: REQUEST_ID,
            jsonrpc: JSONRPC_VERSION,
            method: "call",
            params: (sid, object, method, params),
        }
    }
}

/// Outcome of reading the `result` array of a reply.
#[derive(Debug, PartialEq)]
pub(crate) enum RpcOutcome {
    /// Status 0 (or no status at all). Carries `result[1]`, or an empty
    /// object when the device sent no payload.
    Success(Value),
    /// Non-zero status.
    Failure { code: Option<i64> },
}

/// Interpret `response["result"]`.
///
/// A missing or empty `result` is treated as success with an empty payload;
/// only an explicit non-zero `result[0]` is a failure. A JSON-RPC `error`
/// member is not consulted.
pub(crate) fn interpret(response: &Value) -> RpcOutcome {
    let result = response
        .get("result")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    if let Some(status) = result.first() {
        if !is_zero(status) {
            return RpcOutcome::Failure {
                code: status.as_i64(),
            };
        }
    }

    let payload = result
        .get(1)
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    RpcOutcome::Success(payload)
}

// Numeric zero in any JSON spelling (`0`, `0.0`).
fn is_zero(status: &Value) -> bool {
    status.as_f64() == Some(0.0)
}
