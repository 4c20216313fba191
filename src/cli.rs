use clap::{Parser, Subcommand};
use std::path::PathBuf;

use teth_wallet::provider::ProviderPolicy;

/// Tethereum (T99) wallet client: connect a Coinbase-style wallet, keep it
/// on BNB Smart Chain, and show the T99 balance and price.
#[derive(Parser)]
#[command(name = "teth-wallet", version, about)]
pub struct Cli {
    /// Config file (default: <config dir>/teth-wallet/config.json when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// BSC JSON-RPC endpoint for the SDK connector
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// Provider policy: sdk_only or prefer_extension
    #[arg(long, global = true)]
    pub provider: Option<ProviderPolicy>,

    /// Log at debug level
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Look up the T99 USD price
    Price {
        /// Keep refreshing on the configured interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },

    /// Read the T99 balance of an address (read-only, no authorization)
    Balance {
        /// Address to read, any letter case
        address: String,
    },

    /// Run the full connection flow through the SDK connector
    Connect {
        /// Account(s) the connector exposes once authorized
        #[arg(long = "account", required = true)]
        accounts: Vec<String>,

        /// Keep the session open, following wallet events and price
        /// updates until Ctrl-C
        #[arg(long)]
        watch: bool,
    },

    /// Print the BNB Smart Chain descriptor used for switch/add requests
    Chain,

    /// Print the effective configuration
    Config,
}
