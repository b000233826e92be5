//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{json, Value};

use mcp_wallet_server::{
    config::Config,
    gate::{Arguments, Catalog, Dispatcher, InvocationRequest, OperationCategory, ServerPolicy},
    wallet::{BackendError, WalletBackend},
    AppState,
};

/// In-memory backend that records every call it receives.
#[derive(Default)]
pub struct CountingBackend {
    calls: Mutex<Vec<(String, Arguments)>>,
    failure: Option<BackendError>,
}

impl CountingBackend {
    pub fn failing(kind: &str, message: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failure: Some(BackendError::new(kind, message)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| op == operation)
            .count()
    }

    pub fn last_arguments(&self) -> Option<Arguments> {
        self.calls.lock().unwrap().last().map(|(_, a)| a.clone())
    }
}

#[async_trait]
impl WalletBackend for CountingBackend {
    async fn invoke(&self, operation: &str, arguments: &Arguments) -> Result<Value, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((operation.to_string(), arguments.clone()));
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        match operation {
            "getBalance" => Ok(json!({ "balance": "1000000000000000000", "denom": "wei" })),
            "sendToken" => Ok(json!({ "txHash": "0xfeed" })),
            other => Ok(json!({ "operation": other })),
        }
    }
}

pub fn read_only_policy() -> ServerPolicy {
    ServerPolicy::new(
        [
            OperationCategory::Read,
            OperationCategory::Prepare,
            OperationCategory::Info,
        ],
        true,
    )
}

pub fn full_policy() -> ServerPolicy {
    ServerPolicy::new(OperationCategory::ALL, true)
}

pub fn dispatcher(policy: ServerPolicy) -> (Dispatcher, Arc<CountingBackend>) {
    dispatcher_with(policy, CountingBackend::default())
}

pub fn dispatcher_with(policy: ServerPolicy, backend: CountingBackend) -> (Dispatcher, Arc<CountingBackend>) {
    let backend = Arc::new(backend);
    let catalog = Catalog::standard().unwrap();
    (Dispatcher::new(catalog, policy, backend.clone()), backend)
}

pub const APPROVAL_SECRET: &str = "approver-secret";

/// App state whose approval channel accepts `Bearer APPROVAL_SECRET`.
pub fn app_state(policy: ServerPolicy) -> (AppState, Arc<CountingBackend>) {
    let (dispatcher, backend) = dispatcher(policy);
    let config = Config {
        approval_secret: Some(SecretString::new(APPROVAL_SECRET.to_string())),
        ..Config::default()
    };
    (AppState { config, dispatcher }, backend)
}

pub fn args(value: Value) -> Arguments {
    value.as_object().cloned().unwrap_or_default()
}

pub fn request(operation: &str, arguments: Value, id: &str) -> InvocationRequest {
    InvocationRequest::new(operation, args(arguments), id)
}
