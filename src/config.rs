// src/config.rs

use std::collections::BTreeSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use ethers::signers::{coins_bip39::English, LocalWallet, MnemonicBuilder, Signer};
use ethers::types::Address;
use secrecy::{ExposeSecret, SecretString};

use crate::gate::{DisconnectPolicy, OperationCategory, ServerPolicy};

/// How the wallet identity was supplied. Only the address ever leaves this module.
#[derive(Clone, Debug, Default)]
pub enum WalletIdentity {
    PrivateKey(SecretString),
    Mnemonic(SecretString),
    Address(String),
    /// No identity configured: read-only with the zero address.
    #[default]
    ReadOnly,
}

impl WalletIdentity {
    /// Derives the public address without keeping any signer around.
    pub fn address(&self) -> Result<Address> {
        match self {
            WalletIdentity::PrivateKey(key) => {
                let wallet = LocalWallet::from_str(key.expose_secret().trim_start_matches("0x"))
                    .map_err(|_| anyhow!("MCP_PRIVATE_KEY is not a valid private key"))?;
                Ok(wallet.address())
            }
            WalletIdentity::Mnemonic(phrase) => {
                let wallet = MnemonicBuilder::<English>::default()
                    .phrase(phrase.expose_secret().as_str())
                    .build()
                    .map_err(|_| anyhow!("MCP_MNEMONIC is not a valid mnemonic phrase"))?;
                Ok(wallet.address())
            }
            WalletIdentity::Address(addr) => Address::from_str(addr.trim())
                .map_err(|_| anyhow!("MCP_ADDRESS is not a valid EVM address: {}", addr)),
            WalletIdentity::ReadOnly => Ok(Address::zero()),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            WalletIdentity::PrivateKey(_) => "private key",
            WalletIdentity::Mnemonic(_) => "mnemonic",
            WalletIdentity::Address(_) => "address",
            WalletIdentity::ReadOnly => "read-only",
        }
    }
}

// A struct to hold all configuration, loaded once at startup from the .env file.
#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub port: u16,
    pub mcp_mode: bool,

    // Wallet settings
    pub rpc_url: String,
    pub chain_id: u64,
    pub identity: WalletIdentity,

    // Gate settings
    pub allowed_categories: BTreeSet<OperationCategory>,
    pub require_confirmation: bool,
    pub confirmation_timeout_ms: u64,
    pub confirmation_sweep_interval_ms: u64,
    pub pending_on_disconnect: DisconnectPolicy,
    /// Bearer credential for the approval routes; `None` disables them.
    pub approval_secret: Option<SecretString>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            mcp_mode: false,
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 1,
            identity: WalletIdentity::ReadOnly,
            allowed_categories: ServerPolicy::default().allowed_categories,
            require_confirmation: true,
            confirmation_timeout_ms: 300_000,
            confirmation_sweep_interval_ms: 30_000,
            pending_on_disconnect: DisconnectPolicy::Retain,
            approval_secret: None,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load variables from the .env file into the environment
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();

        let port = match lookup("MCP_PORT").or_else(|| lookup("PORT")) {
            Some(p) => p.trim().parse().context("MCP_PORT must be a valid port number")?,
            None => defaults.port,
        };

        let rpc_url = lookup("MCP_RPC_URL").unwrap_or(defaults.rpc_url);
        url::Url::parse(&rpc_url).with_context(|| format!("MCP_RPC_URL is not a valid URL: {}", rpc_url))?;

        let chain_id = match lookup("MCP_CHAIN_ID") {
            Some(c) => c.trim().parse().context("MCP_CHAIN_ID must be a valid number")?,
            None => defaults.chain_id,
        };

        // First configured method wins
        let identity = if let Some(key) = lookup("MCP_PRIVATE_KEY") {
            WalletIdentity::PrivateKey(SecretString::new(key))
        } else if let Some(phrase) = lookup("MCP_MNEMONIC") {
            WalletIdentity::Mnemonic(SecretString::new(phrase))
        } else if let Some(addr) = lookup("MCP_ADDRESS") {
            WalletIdentity::Address(addr)
        } else {
            WalletIdentity::ReadOnly
        };

        let allowed_categories = match lookup("ALLOWED_OPERATIONS") {
            Some(list) => parse_categories(&list)?,
            None => defaults.allowed_categories,
        };

        let require_confirmation = match lookup("REQUIRE_CONFIRMATION") {
            Some(v) => parse_bool(&v).context("REQUIRE_CONFIRMATION must be true or false")?,
            None => defaults.require_confirmation,
        };

        let confirmation_timeout_ms = parse_positive_ms(
            lookup("CONFIRMATION_TIMEOUT_MS"),
            defaults.confirmation_timeout_ms,
            "CONFIRMATION_TIMEOUT_MS",
        )?;
        let confirmation_sweep_interval_ms = parse_positive_ms(
            lookup("CONFIRMATION_SWEEP_INTERVAL_MS"),
            defaults.confirmation_sweep_interval_ms,
            "CONFIRMATION_SWEEP_INTERVAL_MS",
        )?;

        let pending_on_disconnect = match lookup("PENDING_ON_DISCONNECT").as_deref().map(str::trim) {
            None | Some("retain") => DisconnectPolicy::Retain,
            Some("cancel") => DisconnectPolicy::Cancel,
            Some(other) => bail!("PENDING_ON_DISCONNECT must be 'retain' or 'cancel', got '{}'", other),
        };

        let approval_secret = match lookup("APPROVAL_SECRET") {
            Some(s) if s.trim().is_empty() => bail!("APPROVAL_SECRET must not be empty"),
            Some(s) => Some(SecretString::new(s.trim().to_string())),
            None => None,
        };

        Ok(Config {
            port,
            mcp_mode: lookup("MCP_MODE").is_some(),
            rpc_url,
            chain_id,
            identity,
            allowed_categories,
            require_confirmation,
            confirmation_timeout_ms,
            confirmation_sweep_interval_ms,
            pending_on_disconnect,
            approval_secret,
        })
    }

    /// The policy handed to the dispatcher at startup.
    pub fn server_policy(&self) -> ServerPolicy {
        ServerPolicy::new(self.allowed_categories.iter().copied(), self.require_confirmation)
            .with_timeout(Duration::from_millis(self.confirmation_timeout_ms))
            .with_disconnect_policy(self.pending_on_disconnect)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_sweep_interval_ms)
    }
}

fn parse_categories(list: &str) -> Result<BTreeSet<OperationCategory>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| OperationCategory::from_str(s).map_err(|e| anyhow!("ALLOWED_OPERATIONS: {}", e)))
        .collect()
}

fn parse_bool(v: &str) -> Result<bool> {
    match v.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("invalid boolean '{}'", other),
    }
}

fn parse_positive_ms(raw: Option<String>, default: u64, name: &str) -> Result<u64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let ms: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{} must be a number of milliseconds", name))?;
    if ms == 0 {
        bail!("{} must be greater than zero", name);
    }
    Ok(ms)
}
