// src/wallet/rpc.rs

//! Wallet backend over a plain EVM JSON-RPC endpoint.
//!
//! Serves the read, prepare and network-info operations the node can answer
//! on its own. It holds no signing key: transaction operations report
//! `signer_unavailable`, and operations that need an indexer, price feed or
//! router report `unsupported`.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::{
    abi::{encode, Token},
    providers::{Http, Middleware, Provider},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, U256},
    utils::{keccak256, to_checksum},
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{kinds, BackendError, WalletBackend};
use crate::gate::models::Arguments;
use crate::utils;

#[derive(Clone)]
pub struct RpcWalletBackend {
    provider: Arc<Provider<Http>>,
    chain_id: u64,
    address: Address,
}

impl RpcWalletBackend {
    pub fn new(rpc_url: &str, chain_id: u64, address: Address) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| anyhow!("Failed to create provider for {}: {}", rpc_url, e))?;
        Ok(Self {
            provider: Arc::new(provider),
            chain_id,
            address,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn owner_or_self(&self, args: &Arguments) -> Result<Address, BackendError> {
        match utils::get_optional_arg::<String>(args, "address")? {
            Some(s) => parse_address(&s, "address"),
            None => Ok(self.address),
        }
    }

    /// Builds the call object shared by `createTransaction` and `estimateGas`.
    fn build_request(&self, args: &Arguments) -> Result<TransactionRequest, BackendError> {
        let to = parse_address(&utils::get_required_arg::<String>(args, "to")?, "to")?;
        let mut tx = TransactionRequest::new()
            .from(self.address)
            .to(to)
            .chain_id(self.chain_id);
        if let Some(v) = args.get("value") {
            tx = tx.value(parse_wei(v, "value")?);
        }
        if let Some(data) = utils::get_optional_arg::<String>(args, "data")? {
            let bytes = Bytes::from_str(&data)
                .map_err(|_| BackendError::invalid_arguments("'data' must be 0x-prefixed hex"))?;
            tx = tx.data(bytes);
        }
        Ok(tx)
    }

    async fn get_balance(&self, args: &Arguments) -> Result<Value, BackendError> {
        let owner = self.owner_or_self(args)?;
        let balance = self
            .provider
            .get_balance(owner, None)
            .await
            .map_err(rpc_error)?;
        Ok(json!({
            "address": to_checksum(&owner, None),
            "balance": balance.to_string(),
            "denom": "wei",
        }))
    }

    async fn get_token_balance(&self, args: &Arguments) -> Result<Value, BackendError> {
        let token = parse_address(
            &utils::get_required_arg::<String>(args, "tokenAddress")?,
            "tokenAddress",
        )?;
        let owner = self.owner_or_self(args)?;

        let selector = keccak256("balanceOf(address)");
        let mut calldata = selector[..4].to_vec();
        calldata.extend(encode(&[Token::Address(owner)]));

        let call: TypedTransaction = TransactionRequest::new()
            .to(token)
            .data(Bytes::from(calldata))
            .into();
        let raw = self.provider.call(&call, None).await.map_err(rpc_error)?;
        if raw.len() < 32 {
            return Err(BackendError::new(
                kinds::RPC_ERROR,
                format!("balanceOf returned {} bytes; is {:?} an ERC-20 contract?", raw.len(), token),
            ));
        }
        let balance = U256::from_big_endian(&raw[..32]);
        Ok(json!({
            "token": to_checksum(&token, None),
            "address": to_checksum(&owner, None),
            "balance": balance.to_string(),
        }))
    }

    async fn create_transaction(&self, args: &Arguments) -> Result<Value, BackendError> {
        let tx = self.build_request(args)?;
        let nonce = self
            .provider
            .get_transaction_count(self.address, None)
            .await
            .map_err(rpc_error)?;
        let gas_price = self.provider.get_gas_price().await.map_err(rpc_error)?;
        let tx = tx.nonce(nonce).gas_price(gas_price);
        let typed: TypedTransaction = tx.clone().into();
        let gas = self
            .provider
            .estimate_gas(&typed, None)
            .await
            .map_err(rpc_error)?;
        let tx = tx.gas(gas);

        let unsigned = serde_json::to_value(&tx)
            .map_err(|e| BackendError::new(kinds::RPC_ERROR, e.to_string()))?;
        Ok(json!({ "unsignedTransaction": unsigned, "signed": false }))
    }

    async fn estimate_gas(&self, args: &Arguments) -> Result<Value, BackendError> {
        let typed: TypedTransaction = self.build_request(args)?.into();
        let gas = self
            .provider
            .estimate_gas(&typed, None)
            .await
            .map_err(rpc_error)?;
        let gas_price = self.provider.get_gas_price().await.map_err(rpc_error)?;
        Ok(json!({
            "estimatedGas": gas.to_string(),
            "gasPrice": gas_price.to_string(),
            "totalFee": gas.saturating_mul(gas_price).to_string(),
            "denom": "wei",
        }))
    }

    async fn network_status(&self) -> Result<Value, BackendError> {
        let block = self.provider.get_block_number().await.map_err(rpc_error)?;
        let gas_price = self.provider.get_gas_price().await.map_err(rpc_error)?;
        Ok(json!({
            "blockNumber": block.as_u64(),
            "gasPrice": gas_price.to_string(),
        }))
    }

    async fn chain_info(&self) -> Result<Value, BackendError> {
        let remote = self.provider.get_chainid().await.map_err(rpc_error)?;
        let matches = remote == U256::from(self.chain_id);
        if !matches {
            warn!(
                "RPC endpoint reports chain {} but {} is configured",
                remote, self.chain_id
            );
        }
        Ok(json!({
            "chainId": self.chain_id,
            "rpcChainId": remote.to_string(),
            "matchesConfiguration": matches,
        }))
    }
}

#[async_trait]
impl WalletBackend for RpcWalletBackend {
    async fn invoke(&self, operation: &str, arguments: &Arguments) -> Result<Value, BackendError> {
        debug!("RPC backend invoking '{}'", operation);
        match operation {
            "getAddress" => Ok(json!({ "address": to_checksum(&self.address, None) })),
            "getBalance" => self.get_balance(arguments).await,
            "getTokenBalance" => self.get_token_balance(arguments).await,
            "createTransaction" => self.create_transaction(arguments).await,
            "estimateGas" => self.estimate_gas(arguments).await,
            "getNetworkStatus" => self.network_status().await,
            "getChainInfo" => self.chain_info().await,
            "sendTransaction" | "sendToken" | "swap" | "bridge" => Err(BackendError::new(
                kinds::SIGNER_UNAVAILABLE,
                format!("'{}' needs a signer; this backend only prepares unsigned transactions", operation),
            )),
            other => Err(BackendError::unsupported(other)),
        }
    }
}

fn rpc_error(e: ethers::providers::ProviderError) -> BackendError {
    BackendError::new(kinds::RPC_ERROR, e.to_string())
}

fn parse_address(s: &str, field: &str) -> Result<Address, BackendError> {
    Address::from_str(s.trim())
        .map_err(|_| BackendError::invalid_arguments(format!("'{}' is not a valid EVM address", field)))
}

/// Accepts a decimal string or a JSON integer.
fn parse_wei(v: &Value, field: &str) -> Result<U256, BackendError> {
    let invalid = || BackendError::invalid_arguments(format!("'{}' must be a decimal wei amount", field));
    match v {
        Value::String(s) => U256::from_dec_str(s.trim()).map_err(|_| invalid()),
        Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}
