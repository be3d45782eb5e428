// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON-RPC 2.0 message shapes (spec.md §4.5).

use serde::{Deserialize, Serialize};

/// `{jsonrpc:"2.0", id:int, method:string, params:object}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request identifier; responses echo this back.
    pub id: i64,
    /// Method name (`ready`, `execute`, `aggregate`, `shutdown`).
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Request {
    /// Build a request with `jsonrpc` fixed to `"2.0"`.
    pub fn new(id: i64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// One JSON-RPC error object: `{code:int, message:string, data?:any}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Error code (spec.md §4.5 canonical range, or an application code).
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A response, either `{id, result}` or `{id, error}` — never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoes the request id; `None` for parse errors that precede one.
    #[serde(default)]
    pub id: Option<i64>,
    /// Present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl Response {
    /// Build a success response.
    pub fn ok(id: i64, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn err(id: Option<i64>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// `true` if this response carries an error object.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Either shape of message that can cross the wire. Discriminated by the
/// presence of `method` (request) vs. `result`/`error` (response).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// An outbound call or inbound dispatch.
    Request(Request),
    /// A reply to a previously sent request.
    Response(Response),
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Message::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Message::Response(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_round_trips_through_json() {
        let req = Request::new(1, "ready", json!({}));
        let msg = Message::Request(req.clone());
        let text = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back, Message::Request(req));
    }

    #[test]
    fn response_distinguishes_ok_and_error() {
        let ok = Response::ok(1, json!({"ready": true}));
        assert!(!ok.is_error());
        let err = Response::err(Some(1), -32601, "method not found");
        assert!(err.is_error());
    }
}
