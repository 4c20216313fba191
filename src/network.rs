use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::error::{Result, WalletError};
use crate::model::chain::{ChainDescriptor, parse_chain_id};
use crate::provider::{WalletProvider, methods, request_as};

/// Reads and forces the wallet's active chain.
#[derive(Clone)]
pub struct NetworkGuard {
    provider: Arc<dyn WalletProvider>,
}

impl NetworkGuard {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        NetworkGuard { provider }
    }

    /// Active chain id, from `eth_chainId`.
    pub async fn current_chain_id(&self) -> Result<u64> {
        let raw: String = request_as(self.provider.as_ref(), methods::ETH_CHAIN_ID, json!([]))
            .await
            .map_err(|e| WalletError::Provider(format!("reading chain id: {e}")))?;
        parse_chain_id(&raw).ok_or_else(|| WalletError::Provider(format!("malformed chain id `{raw}`")))
    }

    /// Ask the wallet to switch to `chain`, adding it first if the wallet
    /// does not know it. `false` means the user has to switch manually.
    pub async fn switch_to_chain(&self, chain: &ChainDescriptor) -> bool {
        let switch = self
            .provider
            .request(methods::WALLET_SWITCH_CHAIN, json!([{ "chainId": chain.chain_id }]))
            .await;

        let err = match switch {
            Ok(_) => {
                info!(%chain, "switched network");
                return true;
            }
            Err(e) => e,
        };
        if !err.is_unrecognized_chain() {
            warn!(%chain, "switching network failed: {err}");
            return false;
        }

        match self.provider.request(methods::WALLET_ADD_CHAIN, json!([chain])).await {
            Ok(_) => {
                info!(%chain, "added network");
                true
            }
            Err(e) => {
                warn!(%chain, "adding network failed: {e}");
                false
            }
        }
    }
}
