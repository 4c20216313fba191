use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::SdkConfig;
use crate::error::{Result, RpcError, WalletError};
use crate::model::chain::{ChainDescriptor, chain_id_hex, parse_chain_id};

use super::{ProviderEvent, ProviderInfo, WalletProvider, methods};

const EVENT_CAPACITY: usize = 32;

/// The SDK-backed connector.
///
/// Holds the accounts the user authorized and the chain the connector is
/// pointed at. Account and chain methods are answered locally; everything
/// else is forwarded as raw JSON-RPC to the active chain's endpoint.
pub struct RpcWallet {
    info: ProviderInfo,
    accounts: Vec<Address>,
    authorized: AtomicBool,
    endpoint: RwLock<Endpoint>,
    /// chain id → RPC URL for every chain the wallet can switch to.
    known_chains: Mutex<HashMap<u64, String>>,
    events: broadcast::Sender<ProviderEvent>,
}

#[derive(Clone)]
struct Endpoint {
    chain_id: u64,
    client: DynProvider,
}

impl RpcWallet {
    /// Build a connector for `chain`, using `sdk.rpc_url` when set and the
    /// chain's first advertised RPC URL otherwise.
    pub fn connect(sdk: &SdkConfig, chain: &ChainDescriptor, accounts: Vec<Address>) -> Result<Self> {
        let chain_id = chain
            .id()
            .ok_or_else(|| WalletError::Provider(format!("invalid chain id `{}`", chain.chain_id)))?;
        let url = sdk
            .rpc_url
            .as_deref()
            .or_else(|| chain.rpc_url())
            .ok_or_else(|| WalletError::Provider(format!("no RPC URL for {chain}")))?
            .to_string();

        let client = http_client(&url)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let icon = Some(sdk.app_logo_url.trim()).filter(|u| !u.is_empty()).map(str::to_string);
        info!(app = %sdk.app_name, logo = icon.as_deref().unwrap_or("-"), %url, chain_id, "SDK connector ready");
        Ok(RpcWallet {
            info: ProviderInfo {
                name: sdk.app_name.clone(),
                is_coinbase_wallet: true,
                icon,
            },
            accounts,
            authorized: AtomicBool::new(false),
            endpoint: RwLock::new(Endpoint { chain_id, client }),
            known_chains: Mutex::new(HashMap::from([(chain_id, url)])),
            events,
        })
    }

    /// Revoke the site's authorization, as the wallet UI would.
    pub fn revoke(&self) {
        if self.authorized.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(ProviderEvent::AccountsChanged(Vec::new()));
        }
    }

    fn chain_id(&self) -> u64 {
        self.endpoint.read().map(|e| e.chain_id).unwrap_or_default()
    }

    fn account_strings(&self) -> Vec<String> {
        self.accounts.iter().map(|a| a.to_checksum(None)).collect()
    }

    fn request_accounts(&self) -> Value {
        let was_authorized = self.authorized.swap(true, Ordering::SeqCst);
        let accounts = self.account_strings();
        if !was_authorized && !accounts.is_empty() {
            let _ = self.events.send(ProviderEvent::AccountsChanged(accounts.clone()));
        }
        json!(accounts)
    }

    fn switch_chain(&self, params: &Value) -> std::result::Result<Value, RpcError> {
        let raw = params
            .get(0)
            .and_then(|p| p.get("chainId"))
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::new(RpcError::INVALID_PARAMS, "missing chainId"))?;
        let target = parse_chain_id(raw)
            .ok_or_else(|| RpcError::new(RpcError::INVALID_PARAMS, format!("bad chainId `{raw}`")))?;

        if target == self.chain_id() {
            return Ok(Value::Null);
        }
        let url = self
            .known_chains
            .lock()
            .map_err(|_| RpcError::new(RpcError::INTERNAL, "chain registry poisoned"))?
            .get(&target)
            .cloned()
            .ok_or_else(|| RpcError::unrecognized_chain(raw))?;
        self.activate(target, &url)?;
        Ok(Value::Null)
    }

    fn add_chain(&self, params: &Value) -> std::result::Result<Value, RpcError> {
        let descriptor: ChainDescriptor = params
            .get(0)
            .cloned()
            .ok_or_else(|| RpcError::new(RpcError::INVALID_PARAMS, "missing chain descriptor"))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| RpcError::new(RpcError::INVALID_PARAMS, e.to_string()))
            })?;
        let id = descriptor
            .id()
            .ok_or_else(|| RpcError::new(RpcError::INVALID_PARAMS, "bad chainId"))?;
        let url = descriptor
            .rpc_url()
            .ok_or_else(|| RpcError::new(RpcError::INVALID_PARAMS, "rpcUrls is empty"))?
            .to_string();

        self.known_chains
            .lock()
            .map_err(|_| RpcError::new(RpcError::INTERNAL, "chain registry poisoned"))?
            .insert(id, url.clone());
        info!(chain = %descriptor, "chain added");
        if id != self.chain_id() {
            self.activate(id, &url)?;
        }
        Ok(Value::Null)
    }

    fn activate(&self, chain_id: u64, url: &str) -> std::result::Result<(), RpcError> {
        let client = http_client(url).map_err(|e| RpcError::new(RpcError::INTERNAL, e.to_string()))?;
        let mut endpoint = self
            .endpoint
            .write()
            .map_err(|_| RpcError::new(RpcError::INTERNAL, "endpoint poisoned"))?;
        *endpoint = Endpoint { chain_id, client };
        drop(endpoint);

        info!(chain_id, %url, "switched chain");
        let _ = self.events.send(ProviderEvent::ChainChanged(chain_id_hex(chain_id)));
        Ok(())
    }

    async fn forward(&self, method: &str, params: Value) -> std::result::Result<Value, RpcError> {
        let client = self
            .endpoint
            .read()
            .map_err(|_| RpcError::new(RpcError::INTERNAL, "endpoint poisoned"))?
            .client
            .clone();

        client
            .raw_request::<_, Value>(Cow::Owned(method.to_string()), params)
            .await
            .map_err(|e| match e.as_error_resp() {
                Some(payload) => RpcError::new(payload.code, payload.message.to_string()),
                None => RpcError::new(RpcError::INTERNAL, e.to_string()),
            })
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn request(&self, method: &str, params: Value) -> std::result::Result<Value, RpcError> {
        debug!(method, %params, "wallet request");
        match method {
            methods::ETH_ACCOUNTS => {
                if self.authorized.load(Ordering::SeqCst) {
                    Ok(json!(self.account_strings()))
                } else {
                    Ok(json!([]))
                }
            }
            methods::ETH_REQUEST_ACCOUNTS => Ok(self.request_accounts()),
            methods::ETH_CHAIN_ID => Ok(json!(chain_id_hex(self.chain_id()))),
            methods::WALLET_SWITCH_CHAIN => self.switch_chain(&params),
            methods::WALLET_ADD_CHAIN => self.add_chain(&params),
            _ => self.forward(method, params).await,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    fn info(&self) -> ProviderInfo {
        self.info.clone()
    }
}

fn http_client(url: &str) -> Result<DynProvider> {
    let parsed = url
        .parse::<reqwest::Url>()
        .map_err(|e| WalletError::Provider(format!("invalid RPC URL `{url}`: {e}")))?;
    Ok(ProviderBuilder::new().connect_http(parsed).erased())
}
