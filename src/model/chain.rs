use serde::{Deserialize, Serialize};

/// BNB Smart Chain mainnet.
pub const BSC_CHAIN_ID: u64 = 56;

/// An EVM chain as a wallet understands it.
///
/// Serializes to the exact `wallet_addEthereumChain` parameter object:
/// `{"chainId": "0x38", "chainName": "BNB Smart Chain", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDescriptor {
    /// Chain id as a `0x`-prefixed hex quantity.
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

// ── Methods ──────────────────────────────────────────────────────────

impl ChainDescriptor {
    /// Numeric chain id, if the hex quantity is well formed.
    pub fn id(&self) -> Option<u64> {
        parse_chain_id(&self.chain_id)
    }

    /// First RPC endpoint advertised for this chain.
    pub fn rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(String::as_str)
    }
}

// ── Convenience constructors ─────────────────────────────────────────

impl ChainDescriptor {
    pub fn bsc() -> Self {
        ChainDescriptor {
            chain_id: chain_id_hex(BSC_CHAIN_ID),
            chain_name: "BNB Smart Chain".into(),
            native_currency: NativeCurrency {
                name: "BNB".into(),
                symbol: "BNB".into(),
                decimals: 18,
            },
            rpc_urls: vec!["https://bsc-dataseed.binance.org/".into()],
            block_explorer_urls: vec!["https://bscscan.com/".into()],
        }
    }
}

impl Default for ChainDescriptor {
    fn default() -> Self {
        Self::bsc()
    }
}

// ── Hex quantities ───────────────────────────────────────────────────

/// Encode a chain id the way EIP-1193 wallets report it (`56` → `"0x38"`).
pub fn chain_id_hex(id: u64) -> String {
    format!("{id:#x}")
}

/// Parse a wallet-reported chain id. Accepts `0x`-prefixed hex and, for
/// lenient wallets, plain decimal.
pub fn parse_chain_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

// ── Display ──────────────────────────────────────────────────────────

impl std::fmt::Display for ChainDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{} ({id})", self.chain_name),
            None => write!(f, "{}", self.chain_name),
        }
    }
}
