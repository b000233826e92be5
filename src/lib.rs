// src/lib.rs

pub mod api;
pub mod config;
pub mod gate;
pub mod mcp;
pub mod utils;
pub mod wallet;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: config::Config,
    /// Gated entry point to the wallet backend
    pub dispatcher: gate::Dispatcher,
}
