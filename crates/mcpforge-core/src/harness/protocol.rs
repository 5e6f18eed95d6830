//! Client-side JSON-RPC 2.0 framing for MCP.

use serde::Serialize;
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision offered in `initialize`.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-03-26";

/// An outgoing request or, with no `id`, a notification.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn call(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            method,
            params,
        }
    }

    pub fn notification(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method,
            params,
        }
    }
}

/// A JSON-RPC error object returned by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

/// A validated JSON-RPC response.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    Result(Value),
    Error(RpcErrorObject),
}

/// Validate a response message. When `expected_id` is set the response
/// `id` must match it.
pub fn parse_response(message: &Value, expected_id: Option<u64>) -> Result<RpcOutcome, String> {
    let obj = message
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_owned())?;

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(format!("response jsonrpc field is not \"{JSONRPC_VERSION}\""));
    }

    if let Some(expected) = expected_id {
        let id = obj.get("id").unwrap_or(&Value::Null);
        let matches = id.as_u64() == Some(expected)
            || id.as_str().is_some_and(|s| s == expected.to_string());
        if !matches {
            return Err(format!("response id {id} does not match request id {expected}"));
        }
    }

    match (obj.get("result"), obj.get("error")) {
        (Some(_), Some(_)) => Err("response carries both result and error".to_owned()),
        (Some(result), None) => Ok(RpcOutcome::Result(result.clone())),
        (None, Some(error)) => parse_error_object(error).map(RpcOutcome::Error),
        (None, None) => Err("response carries neither result nor error".to_owned()),
    }
}

/// Validate a JSON-RPC error object: integer `code`, string `message`.
pub fn parse_error_object(error: &Value) -> Result<RpcErrorObject, String> {
    let obj = error
        .as_object()
        .ok_or_else(|| "error member is not an object".to_owned())?;
    let code = obj
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| "error code is missing or not an integer".to_owned())?;
    let message = obj
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| "error message is missing or not a string".to_owned())?;
    Ok(RpcErrorObject {
        code,
        message: message.to_owned(),
        data: obj.get("data").cloned(),
    })
}

/// Whether `message` looks like a response (as opposed to a server
/// request or notification).
pub fn is_response(message: &Value) -> bool {
    message.get("result").is_some() || message.get("error").is_some()
}
