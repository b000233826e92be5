mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request as HttpRequest, StatusCode},
};
use serde_json::{json, Value};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tower::ServiceExt;

use common::{app_state, full_policy, read_only_policy, APPROVAL_SECRET};
use mcp_wallet_server::{
    api::create_router,
    gate::DisconnectPolicy,
    mcp::{
        handler::handle_mcp_request,
        protocol::{error_codes, Request},
        stdio,
    },
};

fn rpc(id: Value, method: &str, params: Value) -> Request {
    serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    }))
    .unwrap()
}

fn call(id: i64, name: &str, arguments: Value) -> Request {
    rpc(json!(id), "tools/call", json!({ "name": name, "arguments": arguments }))
}

fn bearer() -> String {
    format!("Bearer {}", APPROVAL_SECRET)
}

fn approval_post(token: &str, decision: &str, authorization: Option<&str>) -> HttpRequest<Body> {
    let mut builder = HttpRequest::builder()
        .method("POST")
        .uri(format!("/api/confirmations/{}", token))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder
        .body(Body::from(json!({ "decision": decision }).to_string()))
        .unwrap()
}

async fn park(state: &mcp_wallet_server::AppState, id: i64, name: &str) -> String {
    let resp = handle_mcp_request(call(id, name, json!({})), state.clone(), "t")
        .await
        .unwrap();
    resp.result.unwrap()["structuredContent"]["confirmation_token"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_initialize_reports_server_info() {
    let (state, _) = app_state(read_only_policy());
    let resp = handle_mcp_request(rpc(json!(1), "initialize", json!({})), state, "t")
        .await
        .unwrap();
    let result = resp.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "mcp_wallet");
    assert!(result["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let (state, _) = app_state(read_only_policy());
    let req: Request =
        serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
    assert!(handle_mcp_request(req, state, "t").await.is_none());
}

#[tokio::test]
async fn test_tools_list_hides_disallowed_categories() {
    let (state, _) = app_state(read_only_policy());
    let resp = handle_mcp_request(rpc(json!(1), "tools/list", json!({})), state, "t")
        .await
        .unwrap();
    let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();

    assert!(names.contains(&"getBalance"));
    assert!(names.contains(&"createTransaction"));
    assert!(!names.contains(&"sendToken"));
    assert!(!names.contains(&"swap"));
    assert!(tools.iter().all(|t| t["annotations"]["readOnlyHint"] == true));
}

#[tokio::test]
async fn test_tools_list_marks_transactions_destructive() {
    let (state, _) = app_state(full_policy());
    let resp = handle_mcp_request(rpc(json!(1), "tools/list", json!({})), state, "t")
        .await
        .unwrap();
    let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
    let send = tools.iter().find(|t| t["name"] == "sendToken").unwrap();
    assert_eq!(send["annotations"]["category"], "transaction");
    assert_eq!(send["annotations"]["destructiveHint"], true);
}

#[tokio::test]
async fn test_unknown_tool_is_invalid_params() {
    let (state, backend) = app_state(full_policy());
    let resp = handle_mcp_request(call(3, "mintMoney", json!({})), state, "t")
        .await
        .unwrap();
    let err = resp.error.unwrap();
    assert_eq!(err.code, error_codes::INVALID_PARAMS);
    assert!(err.message.contains("mintMoney"));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_unknown_method_is_method_not_found() {
    let (state, _) = app_state(full_policy());
    let resp = handle_mcp_request(rpc(json!(1), "resources/list", json!({})), state, "t")
        .await
        .unwrap();
    assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_denied_call_is_error_result() {
    let (state, backend) = app_state(read_only_policy());
    let resp = handle_mcp_request(call(4, "sendToken", json!({"to": "0xabc"})), state, "t")
        .await
        .unwrap();
    let result = resp.result.unwrap();
    assert_eq!(result["isError"], true);
    assert_eq!(result["structuredContent"]["status"], "rejected");
    assert_eq!(result["structuredContent"]["reason"]["code"], "policy_denied");
    assert_eq!(result["structuredContent"]["reason"]["category"], "transaction");
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_operation_name_as_method_is_gated_too() {
    let (state, backend) = app_state(read_only_policy());
    let resp = handle_mcp_request(rpc(json!(5), "getBalance", json!({})), state.clone(), "t")
        .await
        .unwrap();
    assert_eq!(resp.result.unwrap()["structuredContent"]["status"], "success");

    let resp = handle_mcp_request(rpc(json!(6), "sendToken", json!({})), state, "t")
        .await
        .unwrap();
    assert_eq!(resp.result.unwrap()["isError"], true);
    assert_eq!(backend.calls_to("getBalance"), 1);
    assert_eq!(backend.calls_to("sendToken"), 0);
}

#[tokio::test]
async fn test_same_id_from_different_sessions_does_not_collide() {
    let (state, _) = app_state(full_policy());
    let a = handle_mcp_request(call(1, "sendToken", json!({})), state.clone(), "s1")
        .await
        .unwrap();
    let b = handle_mcp_request(call(1, "sendToken", json!({})), state.clone(), "s2")
        .await
        .unwrap();
    assert_eq!(a.result.unwrap()["structuredContent"]["status"], "pending");
    assert_eq!(b.result.unwrap()["structuredContent"]["status"], "pending");
    assert_eq!(state.dispatcher.pending().len(), 2);
}

#[tokio::test]
async fn test_pending_then_http_approval() {
    let (state, backend) = app_state(full_policy());
    let resp = handle_mcp_request(
        call(7, "sendToken", json!({"to": "0xabc", "amount": "2"})),
        state.clone(),
        "t",
    )
    .await
    .unwrap();
    let result = resp.result.unwrap();
    assert_eq!(result["isError"], false);
    let token = result["structuredContent"]["confirmation_token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(backend.call_count(), 0);

    let app = create_router(state.clone());
    let listed = app
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/api/confirmations")
                .header(header::AUTHORIZATION, bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(listed.status(), StatusCode::OK);
    let listed = body_json(listed).await;
    assert_eq!(listed[0]["token"], token.as_str());
    assert_eq!(listed[0]["operation_name"], "sendToken");

    let approve = |app: axum::Router| {
        let request = approval_post(&token, "approve", Some(&bearer()));
        async move { app.oneshot(request).await.unwrap() }
    };

    let first = approve(app.clone()).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await;
    assert_eq!(first["status"], "success");
    assert_eq!(first["value"]["txHash"], "0xfeed");

    let second = approve(app).await;
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
    assert_eq!(backend.calls_to("sendToken"), 1);
}

#[tokio::test]
async fn test_http_deny_reports_rejection() {
    let (state, backend) = app_state(full_policy());
    let token = park(&state, 8, "bridge").await;

    let response = create_router(state)
        .oneshot(approval_post(&token, "deny", Some(&bearer())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["reason"]["code"], "denied_by_approver");
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_approval_without_credential_is_refused() {
    let (state, backend) = app_state(full_policy());
    let token = park(&state, 9, "sendToken").await;
    let app = create_router(state.clone());

    for authorization in [None, Some("Bearer wrong-secret"), Some("Basic abc")] {
        let response = app
            .clone()
            .oneshot(approval_post(&token, "approve", authorization))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{:?}", authorization);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    let listed = app
        .oneshot(
            HttpRequest::builder()
                .uri("/api/confirmations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(listed.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(backend.call_count(), 0);
    assert_eq!(state.dispatcher.pending().len(), 1);
}

#[tokio::test]
async fn test_approval_channel_disabled_without_secret() {
    let (mut state, backend) = app_state(full_policy());
    state.config.approval_secret = None;
    let token = park(&state, 10, "sendToken").await;

    let response = create_router(state.clone())
        .oneshot(approval_post(&token, "approve", Some(&bearer())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(backend.call_count(), 0);
    assert_eq!(state.dispatcher.pending().len(), 1);
}

#[tokio::test]
async fn test_cross_origin_requests_get_no_cors_on_approvals() {
    let (state, backend) = app_state(full_policy());
    let token = park(&state, 11, "sendToken").await;
    let app = create_router(state);

    let preflight = app
        .clone()
        .oneshot(
            HttpRequest::builder()
                .method("OPTIONS")
                .uri(format!("/api/confirmations/{}", token))
                .header(header::ORIGIN, "https://evil.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(!preflight.status().is_success());
    assert!(!preflight
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));

    let listed = app
        .clone()
        .oneshot(
            HttpRequest::builder()
                .uri("/api/confirmations")
                .header(header::ORIGIN, "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(listed.status(), StatusCode::UNAUTHORIZED);
    assert!(!listed
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));

    let mut post = approval_post(&token, "approve", None);
    post.headers_mut()
        .insert(header::ORIGIN, "https://evil.example".parse().unwrap());
    let response = app.clone().oneshot(post).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(backend.call_count(), 0);

    // The MCP endpoint itself stays reachable cross-origin
    let rpc_preflight = app
        .oneshot(
            HttpRequest::builder()
                .method("OPTIONS")
                .uri("/api/rpc")
                .header(header::ORIGIN, "https://evil.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(rpc_preflight
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_http_rpc_and_health() {
    let (state, _) = app_state(read_only_policy());
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(
            HttpRequest::builder()
                .method("POST")
                .uri("/api/rpc")
                .header("content-type", "application/json")
                .header("mcp-session-id", "abc")
                .body(Body::from(
                    json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                           "params": {"name": "getBalance", "arguments": {}}})
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["structuredContent"]["value"]["denom"], "wei");

    let health = app
        .oneshot(HttpRequest::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(body_json(health).await["pendingConfirmations"], 0);
}

#[tokio::test]
async fn test_stdio_session_round_trip() {
    let (state, backend) = app_state(read_only_policy());
    let (client, server) = duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let serve = tokio::spawn(stdio::serve(BufReader::new(server_read), server_write, state));

    let (client_read, mut client_write) = tokio::io::split(client);
    client_write
        .write_all(
            concat!(
                r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"getBalance","arguments":{}}}"#,
                "\n",
                "not json\n",
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                "\n",
            )
            .as_bytes(),
        )
        .await
        .unwrap();
    client_write.shutdown().await.unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let mut responses = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        responses.push(serde_json::from_str::<Value>(&line).unwrap());
    }
    serve.await.unwrap().unwrap();

    assert_eq!(responses.len(), 2);
    let parse_error = responses
        .iter()
        .find(|r| r["error"]["code"] == error_codes::PARSE_ERROR)
        .unwrap();
    assert!(parse_error["id"].is_null());
    let balance = responses.iter().find(|r| r["id"] == 1).unwrap();
    assert_eq!(balance["result"]["isError"], false);
    assert_eq!(backend.calls_to("getBalance"), 1);
}

#[tokio::test]
async fn test_stdio_disconnect_cancels_when_configured() {
    let policy = full_policy().with_disconnect_policy(DisconnectPolicy::Cancel);
    let (state, backend) = app_state(policy);
    let (client, server) = duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let serve = tokio::spawn(stdio::serve(
        BufReader::new(server_read),
        server_write,
        state.clone(),
    ));

    let (client_read, mut client_write) = tokio::io::split(client);
    client_write
        .write_all(
            concat!(
                r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"sendToken","arguments":{}}}"#,
                "\n"
            )
            .as_bytes(),
        )
        .await
        .unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let line = lines.next_line().await.unwrap().unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["result"]["structuredContent"]["status"], "pending");
    assert_eq!(state.dispatcher.pending().len(), 1);

    client_write.shutdown().await.unwrap();
    serve.await.unwrap().unwrap();

    assert!(state.dispatcher.pending().is_empty());
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_stdio_disconnect_retains_by_default() {
    let (state, _) = app_state(full_policy());
    let (client, server) = duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let serve = tokio::spawn(stdio::serve(
        BufReader::new(server_read),
        server_write,
        state.clone(),
    ));

    let (client_read, mut client_write) = tokio::io::split(client);
    client_write
        .write_all(
            concat!(
                r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"swap","arguments":{}}}"#,
                "\n"
            )
            .as_bytes(),
        )
        .await
        .unwrap();
    let mut lines = BufReader::new(client_read).lines();
    lines.next_line().await.unwrap().unwrap();

    client_write.shutdown().await.unwrap();
    serve.await.unwrap().unwrap();
    assert_eq!(state.dispatcher.pending().len(), 1);
}
