use thiserror::Error;

/// EIP-1193 error as returned by a wallet provider's `request`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// The user rejected the request.
    pub const USER_REJECTED: i64 = 4001;
    /// The requested method is not supported by the provider.
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    /// `wallet_switchEthereumChain` for a chain the wallet does not know.
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    /// JSON-RPC "internal error", used for transport failures.
    pub const INTERNAL: i64 = -32603;
    /// JSON-RPC "invalid params".
    pub const INVALID_PARAMS: i64 = -32602;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
        }
    }

    pub fn unrecognized_chain(chain_id: &str) -> Self {
        Self::new(
            Self::UNRECOGNIZED_CHAIN,
            format!("Unrecognized chain ID {chain_id}. Try adding the chain using wallet_addEthereumChain first."),
        )
    }

    pub fn user_rejected() -> Self {
        Self::new(Self::USER_REJECTED, "User rejected the request.")
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Self::UNRECOGNIZED_CHAIN
    }
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("No host environment: {0}")]
    Environment(String),

    #[error("Wallet provider unavailable: {0}")]
    Provider(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Invalid address `{0}`")]
    InvalidAddress(String),

    #[error("Wrong network. Expected BSC ({expected}), got {actual}. Please switch to BNB Smart Chain.")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("Failed to fetch balance after {attempts} attempt(s): {reason}")]
    Balance { attempts: u32, reason: String },

    #[error("No accounts found. Please approve the connection.")]
    NoAccounts,
}

impl WalletError {
    /// Whether repeating the same call could succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            WalletError::Provider(_) | WalletError::Balance { .. } => true,
            WalletError::Rpc(e) => e.code != RpcError::USER_REJECTED,
            WalletError::Environment(_)
            | WalletError::InvalidAddress(_)
            | WalletError::WrongNetwork { .. }
            | WalletError::NoAccounts => false,
        }
    }
}

pub type Result<T, E = WalletError> = std::result::Result<T, E>;
