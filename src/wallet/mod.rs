//! # Wallet Backend Module
//!
//! The dispatcher never talks to a chain directly. Every permitted invocation
//! is handed to a [`WalletBackend`], which owns the network, key and routing
//! concerns and reports failures with its own error classification.
//!
//! - `rpc` - read/prepare adapter over an EVM JSON-RPC endpoint

pub mod rpc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::gate::models::Arguments;

pub use rpc::RpcWalletBackend;

/// Error reported by a wallet backend. `kind` is forwarded to the client as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: String,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(kinds::INVALID_ARGUMENTS, message)
    }

    pub fn unsupported(operation: &str) -> Self {
        Self::new(
            kinds::UNSUPPORTED,
            format!("'{}' is not supported by this wallet backend", operation),
        )
    }
}

/// Error kinds emitted by the backends in this crate.
pub mod kinds {
    pub const INVALID_ARGUMENTS: &str = "invalid_arguments";
    pub const RPC_ERROR: &str = "rpc_error";
    pub const UNSUPPORTED: &str = "unsupported";
    pub const SIGNER_UNAVAILABLE: &str = "signer_unavailable";
}

#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// Runs one catalog operation. Only called for invocations the gate let through.
    async fn invoke(&self, operation: &str, arguments: &Arguments) -> Result<Value, BackendError>;
}
