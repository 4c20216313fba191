use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use teth_wallet::AppConfig;

mod cli;
mod commands;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.rpc_url {
        config.sdk.rpc_url = Some(url);
    }
    if let Some(policy) = cli.provider {
        config.provider = policy;
    }

    let rt = tokio::runtime::Runtime::new().context("creating tokio runtime")?;
    match cli.command {
        cli::Command::Price { watch } => rt.block_on(commands::price(&config, watch)),
        cli::Command::Balance { address } => rt.block_on(commands::balance(&config, &address)),
        cli::Command::Connect { accounts, watch } => {
            rt.block_on(commands::connect(&config, &accounts, watch))
        }
        cli::Command::Chain => commands::chain(&config),
        cli::Command::Config => commands::show_config(&config),
    }
}
