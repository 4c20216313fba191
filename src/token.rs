use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::TokenConfig;
use crate::error::{Result, WalletError};
use crate::model::chain::BSC_CHAIN_ID;
use crate::model::token::{TokenBalance, format_units};
use crate::network::NetworkGuard;
use crate::provider::{WalletProvider, methods, request_as};
use crate::retry::AttemptPolicy;

// ── ERC20 contract interface ───────────────────────────────────────

sol! {
    #[allow(missing_docs)]
    contract IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function name() external view returns (string);
    }
}

// ── Address normalization ──────────────────────────────────────────

/// Parse a `0x`-prefixed, 40-hex-digit address in any letter case.
/// A mixed-case string with a wrong EIP-55 checksum is accepted as if it
/// were lower case.
pub fn normalize_address(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    let well_formed = trimmed.len() == 42
        && (trimmed.starts_with("0x") || trimmed.starts_with("0X"))
        && trimmed[2..].bytes().all(|b| b.is_ascii_hexdigit());
    if !well_formed {
        return Err(WalletError::InvalidAddress(input.to_string()));
    }
    trimmed[2..]
        .to_lowercase()
        .parse::<Address>()
        .map_err(|_| WalletError::InvalidAddress(input.to_string()))
}

// ── Reader ─────────────────────────────────────────────────────────

/// Read-only ERC-20 calls against one token, routed through the wallet.
pub struct TokenReader {
    provider: Arc<dyn WalletProvider>,
    token: TokenConfig,
    chain_id: u64,
    balance_policy: AttemptPolicy,
}

impl TokenReader {
    pub fn new(provider: Arc<dyn WalletProvider>, token: TokenConfig) -> Self {
        TokenReader {
            provider,
            token,
            chain_id: BSC_CHAIN_ID,
            balance_policy: AttemptPolicy::balance(),
        }
    }

    pub fn with_balance_policy(mut self, policy: AttemptPolicy) -> Self {
        self.balance_policy = policy;
        self
    }

    pub fn token_address(&self) -> Address {
        self.token.address
    }

    /// Full balance snapshot for `owner`.
    ///
    /// Fails without touching the contract when the address is malformed or
    /// the wallet is on another chain. `decimals`, `symbol` and `name` fall
    /// back to configured defaults; only `balanceOf` is retried and fatal.
    pub async fn read_balance(&self, owner: &str) -> Result<TokenBalance> {
        let owner = normalize_address(owner)?;

        let chain = NetworkGuard::new(self.provider.clone()).current_chain_id().await?;
        if chain != self.chain_id {
            return Err(WalletError::WrongNetwork {
                expected: self.chain_id,
                actual: chain,
            });
        }

        let decimals = match self.call(IERC20::decimalsCall {}).await {
            Ok(d) => d,
            Err(e) => {
                warn!("decimals() failed, using {}: {e}", self.token.default_decimals);
                self.token.default_decimals
            }
        };

        let raw: U256 = self
            .balance_policy
            .run("balanceOf", move || self.call(IERC20::balanceOfCall { owner }))
            .await
            .map_err(|e| WalletError::Balance {
                attempts: e.attempts(),
                reason: e.to_string(),
            })?;

        let symbol = self
            .call(IERC20::symbolCall {})
            .await
            .unwrap_or_else(|e| {
                warn!("symbol() failed, using {}: {e}", self.token.fallback_symbol);
                self.token.fallback_symbol.clone()
            });
        let name = self.call(IERC20::nameCall {}).await.unwrap_or_else(|e| {
            warn!("name() failed, using {}: {e}", self.token.fallback_name);
            self.token.fallback_name.clone()
        });

        let raw_amount = raw.to_string();
        let formatted_amount = format_units(&raw_amount, decimals).ok_or_else(|| WalletError::Balance {
            attempts: 1,
            reason: format!("unformattable amount `{raw_amount}`"),
        })?;

        info!(owner = %owner, %raw_amount, %formatted_amount, %symbol, "balance fetched");
        Ok(TokenBalance {
            raw_amount,
            formatted_amount,
            decimals,
            symbol,
            name,
        })
    }

    async fn call<C: SolCall>(&self, call: C) -> Result<C::Return> {
        let data = Bytes::from(call.abi_encode());
        let params = json!([{ "to": self.token.address, "data": data }, "latest"]);
        debug!(function = C::SIGNATURE, "eth_call");

        let out: Bytes = request_as(self.provider.as_ref(), methods::ETH_CALL, params).await?;
        C::abi_decode_returns(&out)
            .map_err(|e| WalletError::Provider(format!("decoding {} result: {e}", C::SIGNATURE)))
    }
}
