//! Coinbase Wallet session client for the Tethereum (T99) token on BNB
//! Smart Chain: connect, keep the wallet on chain 56, read the token
//! balance and track its USD price.

pub mod config;
pub mod error;
pub mod flow;
pub mod model;
pub mod network;
pub mod price;
pub mod provider;
pub mod retry;
pub mod token;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use config::AppConfig;
pub use error::{RpcError, WalletError};
pub use flow::{ConnectionFlow, ConnectionStep, FlowEvent, WalletState};
pub use provider::{ProviderEvent, WalletProvider};
