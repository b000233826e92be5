//! Operation catalog.
//!
//! Fixed table of every wallet action the server knows about, grouped by
//! category. The table is built once at startup; lookups never mutate it.
//!
//! | Category      | Operations                                                              |
//! |---------------|-------------------------------------------------------------------------|
//! | `read`        | `getAddress`, `getBalance`, `getTokenBalance`, `getTransactionHistory`  |
//! | `prepare`     | `createTransaction`, `estimateGas`, `suggestSwapRoutes`, `prepareBridgeTransaction` |
//! | `info`        | `getTokenPrice`, `getNetworkStatus`, `getChainInfo`                     |
//! | `transaction` | `sendTransaction`, `sendToken`, `swap`, `bridge`                        |

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;

use super::models::OperationCategory;
use super::policy::ServerPolicy;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("operation name must not be empty")]
    EmptyName,
    #[error("duplicate operation name: {0}")]
    DuplicateName(String),
    #[error("operation '{name}' is marked mutating but belongs to category '{category}'")]
    MutatingOutsideTransaction {
        name: String,
        category: OperationCategory,
    },
}

/// Static description of one wallet action.
#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub category: OperationCategory,
    pub mutates: bool,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl OperationDescriptor {
    pub fn new(
        name: impl Into<String>,
        category: OperationCategory,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            mutates: category == OperationCategory::Transaction,
            description: description.into(),
            input_schema,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    descriptors: Vec<OperationDescriptor>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Builds a catalog from an arbitrary table, validating it.
    pub fn from_descriptors(descriptors: Vec<OperationDescriptor>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (i, d) in descriptors.iter().enumerate() {
            if d.name.trim().is_empty() {
                return Err(CatalogError::EmptyName);
            }
            if d.mutates && d.category != OperationCategory::Transaction {
                return Err(CatalogError::MutatingOutsideTransaction {
                    name: d.name.clone(),
                    category: d.category,
                });
            }
            if index.insert(d.name.clone(), i).is_some() {
                return Err(CatalogError::DuplicateName(d.name.clone()));
            }
        }
        Ok(Self { descriptors, index })
    }

    /// The wallet operation table served by this crate.
    pub fn standard() -> Result<Self, CatalogError> {
        Self::from_descriptors(standard_descriptors())
    }

    pub fn lookup(&self, name: &str) -> Option<&OperationDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// All descriptors, in table order.
    pub fn descriptors(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.descriptors.iter()
    }

    /// Descriptors whose category the policy allows.
    pub fn permitted<'a>(
        &'a self,
        policy: &'a ServerPolicy,
    ) -> impl Iterator<Item = &'a OperationDescriptor> + 'a {
        self.descriptors
            .iter()
            .filter(move |d| policy.allows(d.category))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn address_prop(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

fn standard_descriptors() -> Vec<OperationDescriptor> {
    use OperationCategory::*;

    vec![
        // --- Read-only operations ---
        OperationDescriptor::new(
            "getAddress",
            Read,
            "Get the wallet address.",
            json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        ),
        OperationDescriptor::new(
            "getBalance",
            Read,
            "Get the native (ETH) balance in wei. Defaults to the wallet address.",
            json!({
                "type": "object",
                "properties": {
                    "address": address_prop("Optional 0x... address to query.")
                }
            }),
        ),
        OperationDescriptor::new(
            "getTokenBalance",
            Read,
            "Get an ERC-20 token balance. Defaults to the wallet address.",
            json!({
                "type": "object",
                "properties": {
                    "tokenAddress": address_prop("ERC-20 contract address."),
                    "address": address_prop("Optional owner address.")
                },
                "required": ["tokenAddress"]
            }),
        ),
        OperationDescriptor::new(
            "getTransactionHistory",
            Read,
            "Get recent transactions for the wallet.",
            json!({
                "type": "object",
                "properties": {
                    "address": address_prop("Optional address."),
                    "limit": {"type": "integer", "minimum": 1}
                }
            }),
        ),
        // --- Preparation operations ---
        OperationDescriptor::new(
            "createTransaction",
            Prepare,
            "Create an unsigned transaction from the wallet address.",
            json!({
                "type": "object",
                "properties": {
                    "to": address_prop("Recipient 0x... address."),
                    "value": {"type": "string", "description": "Amount in wei (decimal)."},
                    "data": {"type": "string", "description": "Optional 0x-prefixed calldata."}
                },
                "required": ["to"]
            }),
        ),
        OperationDescriptor::new(
            "estimateGas",
            Prepare,
            "Estimate gas for a transaction from the wallet address.",
            json!({
                "type": "object",
                "properties": {
                    "to": address_prop("Recipient 0x... address."),
                    "value": {"type": "string", "description": "Amount in wei (decimal)."},
                    "data": {"type": "string", "description": "Optional 0x-prefixed calldata."}
                },
                "required": ["to"]
            }),
        ),
        OperationDescriptor::new(
            "suggestSwapRoutes",
            Prepare,
            "Suggest swap routes between two tokens.",
            json!({
                "type": "object",
                "properties": {
                    "fromToken": {"type": "string"},
                    "toToken": {"type": "string"},
                    "amount": {"type": "string"}
                },
                "required": ["fromToken", "toToken", "amount"]
            }),
        ),
        OperationDescriptor::new(
            "prepareBridgeTransaction",
            Prepare,
            "Prepare a cross-chain bridge transaction.",
            json!({
                "type": "object",
                "properties": {
                    "token": {"type": "string"},
                    "amount": {"type": "string"},
                    "toChainId": {"type": "integer"}
                },
                "required": ["token", "amount", "toChainId"]
            }),
        ),
        // --- Information services ---
        OperationDescriptor::new(
            "getTokenPrice",
            Info,
            "Get token price information.",
            json!({
                "type": "object",
                "properties": { "token": {"type": "string"} },
                "required": ["token"]
            }),
        ),
        OperationDescriptor::new(
            "getNetworkStatus",
            Info,
            "Get the latest block number and gas price.",
            json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        ),
        OperationDescriptor::new(
            "getChainInfo",
            Info,
            "Get chain information for the connected network.",
            json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        ),
        // --- Transaction operations ---
        OperationDescriptor::new(
            "sendTransaction",
            Transaction,
            "Send ETH. Requires confirmation when enabled.",
            json!({
                "type": "object",
                "properties": {
                    "to": address_prop("Recipient 0x... address."),
                    "value": {"type": "string", "description": "Amount in wei (decimal)."},
                    "data": {"type": "string"}
                },
                "required": ["to", "value"]
            }),
        ),
        OperationDescriptor::new(
            "sendToken",
            Transaction,
            "Send ERC-20 tokens. Requires confirmation when enabled.",
            json!({
                "type": "object",
                "properties": {
                    "tokenAddress": address_prop("ERC-20 contract address."),
                    "to": address_prop("Recipient 0x... address."),
                    "amount": {"type": "string", "description": "Amount in base units."}
                },
                "required": ["tokenAddress", "to", "amount"]
            }),
        ),
        OperationDescriptor::new(
            "swap",
            Transaction,
            "Swap tokens. Requires confirmation when enabled.",
            json!({
                "type": "object",
                "properties": {
                    "fromToken": {"type": "string"},
                    "toToken": {"type": "string"},
                    "amount": {"type": "string"},
                    "slippageBps": {"type": "integer"}
                },
                "required": ["fromToken", "toToken", "amount"]
            }),
        ),
        OperationDescriptor::new(
            "bridge",
            Transaction,
            "Bridge assets to another chain. Requires confirmation when enabled.",
            json!({
                "type": "object",
                "properties": {
                    "token": {"type": "string"},
                    "amount": {"type": "string"},
                    "toChainId": {"type": "integer"}
                },
                "required": ["token", "amount", "toChainId"]
            }),
        ),
    ]
}
