//! # MCP Handler Module
//!
//! Implements the Model Context Protocol surface of the wallet server: it
//! answers the protocol's housekeeping methods and forwards tool calls to the
//! [`Dispatcher`](crate::gate::Dispatcher).
//!
//! ## Methods
//! - `initialize` - server info and capabilities
//! - `ping` - liveness
//! - `tools/list` - operations whose category the policy allows
//! - `tools/call` - one gated wallet operation
//!
//! Calling an operation name directly as the method (e.g. `getBalance`) is
//! accepted as shorthand for `tools/call`.
//!
//! There is no approval method here: confirmations are resolved
//! out-of-band through the HTTP approval channel, never by the assistant.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::{
    gate::models::{ErrorKind, InvocationRequest, InvocationResult},
    mcp::protocol::{error_codes, render_tool_result, Request, Response},
    utils, AppState,
};

pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// This is the main dispatcher for all incoming MCP requests.
///
/// `session` names the transport connection; it scopes request ids so two
/// clients reusing the same JSON-RPC id never collide.
pub async fn handle_mcp_request(req: Request, state: AppState, session: &str) -> Option<Response> {
    debug!("Handling MCP request for method: {}", req.method);

    if req.is_notification() {
        return None;
    }

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(&req),
        "ping" => Response::success(req.id.clone(), json!({})),
        "tools/list" => handle_tools_list(&req, &state).await,
        "tools/call" => handle_tool_call(req, state, session).await,
        method if state.dispatcher.catalog().lookup(method).is_some() => {
            // Rewritten into tools/call to reuse the same gate
            let wrapped = Request {
                jsonrpc: req.jsonrpc.clone(),
                id: req.id.clone(),
                method: "tools/call".to_string(),
                params: Some(json!({
                    "name": method,
                    "arguments": req.params.clone().unwrap_or_else(|| json!({}))
                })),
            };
            handle_tool_call(wrapped, state, session).await
        }
        _ => Response::error(
            req.id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };

    Some(response)
}

/// Handles a 'tools/call' request by handing it to the dispatcher.
async fn handle_tool_call(req: Request, state: AppState, session: &str) -> Response {
    let Some(params) = req.params.as_ref() else {
        return Response::error(
            req.id,
            error_codes::INVALID_PARAMS,
            "Missing 'params' object".into(),
        );
    };

    let Some(tool_name) = params.get("name").and_then(|n| n.as_str()) else {
        return Response::error(
            req.id,
            error_codes::INVALID_PARAMS,
            "Missing 'name' field in params".into(),
        );
    };

    let Some(arguments) = utils::arguments_from_value(params.get("arguments")) else {
        return Response::error(
            req.id,
            error_codes::INVALID_PARAMS,
            "'arguments' must be an object".into(),
        );
    };

    let invocation = InvocationRequest::new(
        tool_name,
        arguments,
        format!("{}:{}", session, req.id_token()),
    )
    .with_session(session);

    let result = state.dispatcher.handle(invocation).await;
    info!("tools/call '{}' -> {}", tool_name, outcome_label(&result));

    if let InvocationResult::Failed {
        error_kind: ErrorKind::NotFound,
        message,
        ..
    } = &result
    {
        return Response::error(req.id, error_codes::INVALID_PARAMS, message.clone());
    }

    Response::success(req.id, render_tool_result(tool_name, &result))
}

fn outcome_label(result: &InvocationResult) -> String {
    match result {
        InvocationResult::Success { .. } => "success".to_string(),
        InvocationResult::Pending { .. } => "pending".to_string(),
        other => other
            .error_kind()
            .map(|k| k.to_string())
            .unwrap_or_default(),
    }
}

/// Handles the 'initialize' request.
fn handle_initialize(req: &Request) -> Response {
    let server_info = json!({
        "name": "mcp_wallet",
        "version": env!("CARGO_PKG_VERSION")
    });
    let capabilities = json!({ "tools": { "listChanged": false } });
    let instructions = "EVM wallet MCP server. Read, prepare and info operations run directly \
        when permitted. Transaction operations return a confirmation token and run only after \
        the user approves them out-of-band.";

    Response::success(
        req.id.clone(),
        json!({
            "serverInfo": server_info,
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": capabilities,
            "instructions": instructions
        }),
    )
}

/// Handles the 'tools/list' request with the operations the current policy permits.
async fn handle_tools_list(req: &Request, state: &AppState) -> Response {
    let tools: Vec<Value> = state
        .dispatcher
        .tools()
        .await
        .into_iter()
        .map(|d| {
            json!({
                "name": d.name,
                "description": d.description,
                "inputSchema": d.input_schema,
                "annotations": {
                    "category": d.category,
                    "readOnlyHint": !d.mutates,
                    "destructiveHint": d.mutates
                }
            })
        })
        .collect();
    Response::success(req.id.clone(), json!({ "tools": tools }))
}
