use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, WalletError};

use super::WalletProvider;

/// Which provider to use when both an injected extension and the SDK
/// connector are available. A product decision, so it is configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPolicy {
    /// Use an injected (extension) provider when one exists, Coinbase
    /// Wallet first; construct the SDK connector only as a last resort.
    PreferExtension,
    /// Always construct the SDK connector and ignore injected providers.
    #[default]
    SdkOnly,
}

impl FromStr for ProviderPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "prefer_extension" | "extension" => Ok(ProviderPolicy::PreferExtension),
            "sdk_only" | "sdk" => Ok(ProviderPolicy::SdkOnly),
            other => Err(format!(
                "invalid provider policy '{other}'. Use 'prefer_extension' or 'sdk_only'."
            )),
        }
    }
}

/// Providers the host injected into the page.
#[derive(Default, Clone)]
pub struct HostEnvironment {
    /// The page's default provider (`window.ethereum`).
    pub ethereum: Option<Arc<dyn WalletProvider>>,
    /// Every provider when several extensions coexist (`ethereum.providers`).
    pub providers: Vec<Arc<dyn WalletProvider>>,
}

impl HostEnvironment {
    /// A host with nothing injected, e.g. a terminal.
    pub fn bare() -> Self {
        Self::default()
    }
}

/// How a provider was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Default injected provider flagged as Coinbase Wallet.
    CoinbaseExtension,
    /// Coinbase Wallet found in the multi-provider list.
    CoinbaseFromList,
    /// Some other injected provider.
    Injected,
    /// Constructed SDK connector.
    Sdk,
}

pub struct ResolvedProvider {
    pub provider: Arc<dyn WalletProvider>,
    pub kind: ProviderKind,
}

/// Locate or construct the session's wallet provider.
///
/// `host` is `None` when there is no page context at all, which is an
/// [`WalletError::Environment`] error. `make_sdk` is only invoked when the
/// policy lands on the SDK connector.
pub fn resolve<F>(host: Option<&HostEnvironment>, policy: ProviderPolicy, make_sdk: F) -> Result<ResolvedProvider>
where
    F: FnOnce() -> Result<Arc<dyn WalletProvider>>,
{
    let host = host.ok_or_else(|| WalletError::Environment("window is not defined".into()))?;

    let found = match policy {
        ProviderPolicy::SdkOnly => None,
        ProviderPolicy::PreferExtension => find_injected(host),
    };

    let resolved = match found {
        Some(resolved) => resolved,
        None => ResolvedProvider {
            provider: make_sdk()?,
            kind: ProviderKind::Sdk,
        },
    };
    info!(kind = ?resolved.kind, name = %resolved.provider.info().name, ?policy, "wallet provider resolved");
    Ok(resolved)
}

fn find_injected(host: &HostEnvironment) -> Option<ResolvedProvider> {
    if let Some(eth) = &host.ethereum {
        if eth.info().is_coinbase_wallet {
            return Some(ResolvedProvider {
                provider: eth.clone(),
                kind: ProviderKind::CoinbaseExtension,
            });
        }
    }
    if let Some(cb) = host.providers.iter().find(|p| p.info().is_coinbase_wallet) {
        return Some(ResolvedProvider {
            provider: cb.clone(),
            kind: ProviderKind::CoinbaseFromList,
        });
    }
    host.ethereum.as_ref().map(|eth| ResolvedProvider {
        provider: eth.clone(),
        kind: ProviderKind::Injected,
    })
}
