// src/api/confirmations.rs

//! Out-of-band approval channel for parked transaction operations.
//!
//! Every route here requires `Authorization: Bearer <APPROVAL_SECRET>`. With
//! no secret configured the channel refuses everything, so nothing holding
//! only a confirmation token (the assistant, a browser page) can approve.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    gate::models::{Decision, ErrorKind, InvocationResult},
    AppState,
};

const MAX_AUTH_HEADER_BYTES: usize = 1024;

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub decision: Decision,
}

// GET /confirmations
pub async fn list_confirmations_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    Json(state.dispatcher.pending()).into_response()
}

// POST /confirmations/:token
pub async fn resolve_confirmation_handler(
    Path(token): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ResolveRequest>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    info!("Approval channel: {:?} for confirmation {}", req.decision, token);
    let result = state
        .dispatcher
        .resolve_confirmation(&token, req.decision)
        .await;
    (status_for(&result), Json(result)).into_response()
}

/// Checks the bearer credential against the configured approval secret.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(secret) = state.config.approval_secret.as_ref() else {
        warn!("Approval request refused: APPROVAL_SECRET is not configured");
        return Err(unauthorized("approval channel is disabled"));
    };
    let presented = bearer_token(headers).ok_or_else(|| {
        warn!("Approval request refused: missing or malformed credential");
        unauthorized("missing approval credential")
    })?;
    if presented != secret.expose_secret().as_str() {
        warn!("Approval request refused: invalid credential");
        return Err(unauthorized("invalid approval credential"));
    }
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    if value.len() > MAX_AUTH_HEADER_BYTES {
        return None;
    }
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn unauthorized(message: &str) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": message })),
    )
        .into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Bearer realm=\"mcp_wallet approvals\""),
    );
    response
}

fn status_for(result: &InvocationResult) -> StatusCode {
    match result {
        InvocationResult::Success { .. } | InvocationResult::Rejected { .. } => StatusCode::OK,
        InvocationResult::Pending { .. } => StatusCode::ACCEPTED,
        InvocationResult::Failed { error_kind, .. } => match error_kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Timeout => StatusCode::GONE,
            ErrorKind::PolicyDenied => StatusCode::FORBIDDEN,
            ErrorKind::BackendFailure => StatusCode::BAD_GATEWAY,
        },
    }
}
