//! # API Module
//!
//! HTTP surface of the wallet server.
//!
//! ## Available Endpoints
//!
//! - `GET /health` - liveness and number of pending confirmations
//! - `POST /rpc` - JSON-RPC endpoint for MCP tool calls
//! - `GET /confirmations` - transaction operations awaiting approval
//! - `POST /confirmations/:token` - approve or deny one of them
//!   (`{"decision": "approve" | "deny"}`)
//!
//! The confirmation routes need `Authorization: Bearer <APPROVAL_SECRET>` and
//! carry no CORS headers.
//!
//! All routes are nested under `/api`.

pub mod confirmations;
pub mod health;
pub mod rpc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Cross-origin callers may reach the MCP surface only.
    let public = Router::new()
        .route("/health", get(health::health_handler))
        .route("/rpc", post(rpc::rpc_handler))
        .layer(CorsLayer::permissive());

    let approvals = Router::new()
        .route("/confirmations", get(confirmations::list_confirmations_handler))
        .route(
            "/confirmations/:token",
            post(confirmations::resolve_confirmation_handler),
        );

    Router::new()
        .nest("/api", public.merge(approvals))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
