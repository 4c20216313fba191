use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::{Address, address};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::chain::ChainDescriptor;
use crate::provider::ProviderPolicy;
use crate::retry::AttemptPolicy;

/// Tethereum (T99) on BNB Smart Chain.
pub const TETH_CONTRACT_ADDRESS: Address = address!("c98cf0876b23fb1f574be5c59e4217c80b34d327");

pub const DEFAULT_FALLBACK_PRICE: f64 = 0.0001395;

const CONFIG_DIR: &str = "teth-wallet";
const CONFIG_FILE: &str = "config.json";
const ENV_RPC_URL: &str = "TETH_WALLET_RPC_URL";
const ENV_PROVIDER_POLICY: &str = "TETH_WALLET_PROVIDER_POLICY";

/// Everything the session needs; every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub token: TokenConfig,
    pub chain: ChainDescriptor,
    pub price: PriceConfig,
    pub balance_retry: RetryConfig,
    pub provider: ProviderPolicy,
    pub sdk: SdkConfig,
    pub flow: FlowConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub address: Address,
    pub default_decimals: u8,
    pub fallback_symbol: String,
    pub fallback_name: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig {
            address: TETH_CONTRACT_ADDRESS,
            default_decimals: 18,
            fallback_symbol: "TETH".into(),
            fallback_name: "Tethereum".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    pub api_base: String,
    pub fallback_usd: f64,
    pub refresh_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        PriceConfig {
            api_base: "https://api.dexscreener.com".into(),
            fallback_usd: DEFAULT_FALLBACK_PRICE,
            refresh_secs: 30,
            timeout_secs: 10,
        }
    }
}

impl PriceConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub timeout_secs: u64,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = AttemptPolicy::balance();
        RetryConfig {
            attempts: policy.max_attempts,
            timeout_secs: policy.timeout.as_secs(),
            backoff_ms: policy.backoff.as_millis() as u64,
        }
    }
}

impl From<&RetryConfig> for AttemptPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        AttemptPolicy {
            max_attempts: cfg.attempts,
            timeout: Duration::from_secs(cfg.timeout_secs),
            backoff: Duration::from_millis(cfg.backoff_ms),
        }
    }
}

/// Settings for the SDK connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    pub app_name: String,
    pub app_logo_url: String,
    /// Overrides the chain descriptor's first RPC URL.
    pub rpc_url: Option<String>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        SdkConfig {
            app_name: "Tethereum Project".into(),
            app_logo_url: "https://tethereum.com/logo.png".into(),
            rpc_url: None,
        }
    }
}

/// Pauses the connection flow takes to let the wallet settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// After a successful chain switch, before reading the balance.
    pub switch_settle_ms: u64,
    /// Before the first balance read when already on the right chain.
    pub fetch_delay_ms: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            switch_settle_ms: 1000,
            fetch_delay_ms: 1500,
        }
    }
}

impl FlowConfig {
    /// No pauses at all.
    pub fn immediate() -> Self {
        FlowConfig {
            switch_settle_ms: 0,
            fetch_delay_ms: 0,
        }
    }

    pub fn switch_settle(&self) -> Duration {
        Duration::from_millis(self.switch_settle_ms)
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }
}

// ── Loading ──────────────────────────────────────────────────────────

impl AppConfig {
    /// Load from `path`, else the per-user config file when it exists,
    /// else defaults; then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_path().filter(|p| p.exists()),
        };
        let mut config = match file {
            Some(p) => Self::from_file(&p)?,
            None => AppConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Apply `TETH_WALLET_*` overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var(ENV_RPC_URL).filter(|u| !u.is_empty()) {
            self.sdk.rpc_url = Some(url);
        }
        if let Some(policy) = var(ENV_PROVIDER_POLICY).filter(|p| !p.is_empty()) {
            self.provider = policy
                .parse()
                .map_err(|e: String| anyhow::anyhow!("{ENV_PROVIDER_POLICY}: {e}"))?;
        }
        Ok(())
    }

    pub fn balance_policy(&self) -> AttemptPolicy {
        AttemptPolicy::from(&self.balance_retry)
    }
}

/// `<config_dir>/teth-wallet/config.json`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILE))
}
