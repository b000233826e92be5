// src/mcp/protocol.rs

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::gate::models::InvocationResult;

#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }

    /// Request id rendered as the opaque string the dispatcher correlates on.
    pub fn id_token(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message,
                data: None,
            }),
        }
    }
}

// Standard JSON-RPC error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
}

/// Tool result carrying a text block for display and the structured payload.
fn tool_result(text: String, structured: Value, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": structured,
        "isError": is_error,
    })
}

/// Renders an invocation outcome in the MCP `tools/call` result shape.
///
/// Unknown operations are not rendered here: they become a JSON-RPC error
/// (see the handler), everything else is a tool result.
pub fn render_tool_result(operation: &str, result: &InvocationResult) -> Value {
    let structured = serde_json::to_value(result).unwrap_or(Value::Null);
    match result {
        InvocationResult::Success { value } => {
            let text = serde_json::to_string(value).unwrap_or_else(|_| format!("{} succeeded", operation));
            tool_result(text, structured, false)
        }
        InvocationResult::Rejected { reason } => {
            tool_result(format!("{} rejected: {}", operation, reason), structured, true)
        }
        InvocationResult::Pending {
            confirmation_token,
            expires_at,
        } => tool_result(
            format!(
                "{} requires user confirmation. Confirmation token: {} (expires {}). \
                 The user must approve it before it is executed.",
                operation, confirmation_token, expires_at
            ),
            structured,
            false,
        ),
        InvocationResult::Failed {
            error_kind,
            backend_kind,
            message,
        } => {
            let kind = backend_kind
                .clone()
                .unwrap_or_else(|| error_kind.to_string());
            tool_result(format!("{} failed ({}): {}", operation, kind, message), structured, true)
        }
    }
}
