pub mod resolver;
pub mod rpc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{Result, RpcError, WalletError};

pub use resolver::{HostEnvironment, ProviderKind, ProviderPolicy, ResolvedProvider, resolve};
pub use rpc::RpcWallet;

// ── Method names ────────────────────────────────────────────────────

pub mod methods {
    pub const ETH_ACCOUNTS: &str = "eth_accounts";
    pub const ETH_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
    pub const ETH_CHAIN_ID: &str = "eth_chainId";
    pub const ETH_CALL: &str = "eth_call";
    pub const WALLET_SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
    pub const WALLET_ADD_CHAIN: &str = "wallet_addEthereumChain";
}

// ── Events ──────────────────────────────────────────────────────────

/// Events a wallet pushes to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// New account list; empty means the wallet disconnected the site.
    AccountsChanged(Vec<String>),
    /// New active chain as a hex quantity.
    ChainChanged(String),
}

/// Static facts a provider advertises about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderInfo {
    pub name: String,
    pub is_coinbase_wallet: bool,
    /// Logo shown in the wallet's connection prompt.
    pub icon: Option<String>,
}

// ── Provider trait ──────────────────────────────────────────────────

/// An EIP-1193 wallet provider: one `request` entry point plus an event
/// stream. Injected browser wallets and the SDK connector both implement it.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> std::result::Result<Value, RpcError>;

    /// Subscribe to `accountsChanged` / `chainChanged`. Dropping the
    /// receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;

    fn info(&self) -> ProviderInfo {
        ProviderInfo::default()
    }
}

/// `request` with the result deserialized into `T`.
pub async fn request_as<T: DeserializeOwned>(
    provider: &dyn WalletProvider,
    method: &str,
    params: Value,
) -> Result<T> {
    let value = provider.request(method, params).await?;
    serde_json::from_value(value)
        .map_err(|e| WalletError::Provider(format!("malformed `{method}` response: {e}")))
}
