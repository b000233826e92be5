use axum::{extract::State, http::HeaderMap, Json};

use crate::{
    mcp::{
        handler::handle_mcp_request,
        protocol::{error_codes, Request, Response},
    },
    AppState,
};

pub const SESSION_HEADER: &str = "mcp-session-id";

// Forward JSON-RPC requests over HTTP to the MCP handler
pub async fn rpc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<Request>,
) -> Json<Response> {
    let session = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| format!("http-{}", s))
        .unwrap_or_else(|| "http".to_string());

    match handle_mcp_request(req, state, &session).await {
        Some(resp) => Json(resp),
        None => Json(Response::error(
            serde_json::Value::Null,
            error_codes::INVALID_REQUEST,
            "Notifications are not supported over HTTP".into(),
        )),
    }
}
