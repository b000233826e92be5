// src/main.rs

use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use mcp_wallet_server::{
    api,
    config::{Config, WalletIdentity},
    gate::{confirmation::spawn_sweeper, Catalog, Dispatcher, OperationCategory},
    mcp::stdio,
    wallet::RpcWalletBackend,
    AppState,
};
use tokio::io::{self, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the stdio protocol
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcp_wallet_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Fatal error running server: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    info!("Initializing MCP Wallet Server...");

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if env::args().any(|a| a == "--mcp") {
        config.mcp_mode = true;
    }

    let catalog = Catalog::standard().context("Failed to build operation catalog")?;

    if matches!(config.identity, WalletIdentity::ReadOnly) {
        warn!("No authentication method provided. Using read-only mode with zero address.");
    }
    let address = config.identity.address()?;
    let backend = RpcWalletBackend::new(&config.rpc_url, config.chain_id, address)?;
    info!(
        "Wallet {:?} ({}) on chain {} via {}",
        address,
        config.identity.describe(),
        config.chain_id,
        config.rpc_url
    );

    let policy = config.server_policy();
    info!(
        "Allowed operations: {} (confirmation required: {})",
        policy
            .allowed_categories
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        policy.require_confirmation
    );
    if policy.allows(OperationCategory::Transaction)
        && policy.require_confirmation
        && config.approval_secret.is_none()
    {
        warn!("APPROVAL_SECRET is not set: transaction operations can be parked but never approved.");
    }
    let dispatcher = Dispatcher::new(catalog, policy, Arc::new(backend));

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(
        dispatcher.broker().clone(),
        config.sweep_interval(),
        shutdown.clone(),
    );

    let state = AppState { config, dispatcher };

    // The HTTP listener also serves the approval channel, so it runs in both modes.
    let addr = SocketAddr::from(([127, 0, 0, 1], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🚀 HTTP Server listening on {}", addr);

    let app = api::create_router(state.clone());
    let http_shutdown = shutdown.clone();
    let mut http = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await
    });

    if state.config.mcp_mode {
        info!("🚀 Starting MCP server on stdin/stdout...");
        let stdin = BufReader::new(io::stdin());
        tokio::select! {
            res = stdio::serve(stdin, io::stdout(), state.clone()) => res?,
            _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
            res = &mut http => {
                res.context("HTTP server task panicked")?.context("HTTP server failed")?;
            }
        }
    } else {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for shutdown signal")?;
                info!("Shutting down...");
            }
            res = &mut http => {
                res.context("HTTP server task panicked")?.context("HTTP server failed")?;
            }
        }
    }

    shutdown.cancel();
    if !http.is_finished() {
        http.await
            .context("HTTP server task panicked")?
            .context("HTTP server failed")?;
    }
    if let Err(e) = sweeper.await {
        error!("Confirmation sweeper task failed: {}", e);
    }

    info!("MCP Wallet Server stopped");
    Ok(())
}
