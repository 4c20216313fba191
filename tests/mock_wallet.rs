#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use alloy::primitives::{Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use teth_wallet::config::{AppConfig, FlowConfig, RetryConfig};
use teth_wallet::model::chain::{chain_id_hex, parse_chain_id};
use teth_wallet::provider::{ProviderInfo, methods};
use teth_wallet::token::IERC20;
use teth_wallet::{ConnectionFlow, ProviderEvent, RpcError, WalletProvider, WalletState};

pub const ALICE: &str = "0x1111111111111111111111111111111111111111";
pub const BOB: &str = "0x2222222222222222222222222222222222222222";

pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

// ── Script ───────────────────────────────────────────────────────────

/// How the mock answers `wallet_switchEthereumChain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchMode {
    Accept,
    /// Error 4902; a following `wallet_addEthereumChain` succeeds unless
    /// `add_error` is set.
    Unrecognized,
    Reject,
    /// Answers `null` but stays on the current chain.
    Ignore,
}

/// Everything the mock wallet answers, editable between calls.
#[derive(Debug, Clone)]
pub struct Script {
    /// Returned by `eth_requestAccounts`.
    pub accounts: Vec<String>,
    /// Returned by `eth_accounts` (already authorized).
    pub authorized: Vec<String>,
    pub request_accounts_error: Option<RpcError>,
    pub chain_id: u64,
    pub chain_id_error: bool,
    pub switch: SwitchMode,
    pub add_error: Option<RpcError>,
    /// `None` reverts.
    pub balance: Option<U256>,
    /// `balanceOf` never answers.
    pub balance_hangs: bool,
    pub decimals: Option<u8>,
    pub symbol: Option<String>,
    pub name: Option<String>,
}

impl Default for Script {
    fn default() -> Self {
        Script {
            accounts: vec![ALICE.to_string()],
            authorized: Vec::new(),
            request_accounts_error: None,
            chain_id: 56,
            chain_id_error: false,
            switch: SwitchMode::Accept,
            add_error: None,
            balance: Some(U256::from(ONE_TOKEN)),
            balance_hangs: false,
            decimals: Some(18),
            symbol: Some("TETH".into()),
            name: Some("Tethereum".into()),
        }
    }
}

/// One recorded `request`.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub params: Value,
}

// ── Mock wallet ──────────────────────────────────────────────────────

/// Scripted EIP-1193 wallet that records every request.
pub struct MockWallet {
    pub script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
    events: broadcast::Sender<ProviderEvent>,
    info: ProviderInfo,
}

impl MockWallet {
    pub fn new(script: Script) -> Arc<Self> {
        Self::named(script, "Mock Wallet", false)
    }

    pub fn named(script: Script, name: &str, is_coinbase_wallet: bool) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(MockWallet {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
            events,
            info: ProviderInfo {
                name: name.into(),
                is_coinbase_wallet,
                icon: None,
            },
        })
    }

    pub fn edit(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().unwrap());
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribers(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }

    /// Number of `eth_call`s whose calldata starts with `selector`.
    pub fn contract_calls(&self, selector: [u8; 4]) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == methods::ETH_CALL)
            .filter(|c| calldata(&c.params).is_some_and(|d| d.starts_with(&selector)))
            .count()
    }

    fn script(&self) -> Script {
        self.script.lock().unwrap().clone()
    }

    async fn eth_call(&self, params: &Value) -> Result<Value, RpcError> {
        let data = calldata(params).ok_or_else(|| RpcError::new(RpcError::INVALID_PARAMS, "missing data"))?;
        let script = self.script();
        let selector: [u8; 4] = data[..4].try_into().unwrap();

        let out = if selector == IERC20::balanceOfCall::SELECTOR {
            if script.balance_hangs {
                std::future::pending::<()>().await;
            }
            script.balance.map(|b| (b,).abi_encode_params())
        } else if selector == IERC20::decimalsCall::SELECTOR {
            script.decimals.map(|d| (U256::from(d),).abi_encode_params())
        } else if selector == IERC20::symbolCall::SELECTOR {
            script.symbol.map(|s| (s,).abi_encode_params())
        } else if selector == IERC20::nameCall::SELECTOR {
            script.name.map(|s| (s,).abi_encode_params())
        } else {
            None
        };
        match out {
            Some(bytes) => Ok(serde_json::to_value(Bytes::from(bytes)).unwrap()),
            None => Err(RpcError::new(3, "execution reverted")),
        }
    }
}

fn calldata(params: &Value) -> Option<Bytes> {
    serde_json::from_value(params.get(0)?.get("data")?.clone()).ok()
}

fn requested_chain(params: &Value) -> Option<u64> {
    parse_chain_id(params.get(0)?.get("chainId")?.as_str()?)
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.calls.lock().unwrap().push(Call {
            method: method.to_string(),
            params: params.clone(),
        });

        match method {
            methods::ETH_REQUEST_ACCOUNTS => {
                let script = self.script();
                match script.request_accounts_error {
                    Some(e) => Err(e),
                    None => Ok(json!(script.accounts)),
                }
            }
            methods::ETH_ACCOUNTS => Ok(json!(self.script().authorized)),
            methods::ETH_CHAIN_ID => {
                let script = self.script();
                if script.chain_id_error {
                    Err(RpcError::new(RpcError::INTERNAL, "chain id unavailable"))
                } else {
                    Ok(json!(chain_id_hex(script.chain_id)))
                }
            }
            methods::WALLET_SWITCH_CHAIN => {
                let target = requested_chain(&params)
                    .ok_or_else(|| RpcError::new(RpcError::INVALID_PARAMS, "bad chainId"))?;
                match self.script().switch {
                    SwitchMode::Accept => {
                        self.edit(|s| s.chain_id = target);
                        Ok(Value::Null)
                    }
                    SwitchMode::Unrecognized => Err(RpcError::unrecognized_chain(&chain_id_hex(target))),
                    SwitchMode::Reject => Err(RpcError::user_rejected()),
                    SwitchMode::Ignore => Ok(Value::Null),
                }
            }
            methods::WALLET_ADD_CHAIN => {
                let target = requested_chain(&params)
                    .ok_or_else(|| RpcError::new(RpcError::INVALID_PARAMS, "bad chainId"))?;
                match self.script().add_error {
                    Some(e) => Err(e),
                    None => {
                        self.edit(|s| s.chain_id = target);
                        Ok(Value::Null)
                    }
                }
            }
            methods::ETH_CALL => self.eth_call(&params).await,
            other => Err(RpcError::new(
                RpcError::UNSUPPORTED_METHOD,
                format!("{other} not supported"),
            )),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    fn info(&self) -> ProviderInfo {
        self.info.clone()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Defaults with no pauses and a quick, deadline-free balance retry.
pub fn test_config() -> AppConfig {
    AppConfig {
        flow: FlowConfig::immediate(),
        balance_retry: RetryConfig {
            attempts: 3,
            timeout_secs: 0,
            backoff_ms: 0,
        },
        ..AppConfig::default()
    }
}

pub fn flow_over(wallet: &Arc<MockWallet>) -> ConnectionFlow {
    ConnectionFlow::new(wallet.clone(), &test_config())
}

/// Let spawned listeners run until `pred` holds.
pub async fn wait_until(flow: &ConnectionFlow, pred: impl Fn(&WalletState) -> bool) -> WalletState {
    for _ in 0..200 {
        let state = flow.state();
        if pred(&state) {
            return state;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached, state: {:?}", flow.state());
}

/// Give spawned tasks a chance to run.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
