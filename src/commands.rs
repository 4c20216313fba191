use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;

use teth_wallet::model::Price;
use teth_wallet::model::token::usd_value;
use teth_wallet::price::{PriceFetcher, PriceTicker};
use teth_wallet::provider::{self, HostEnvironment, RpcWallet, WalletProvider};
use teth_wallet::token::{TokenReader, normalize_address};
use teth_wallet::{AppConfig, ConnectionFlow, FlowEvent, WalletState};

// ── price ────────────────────────────────────────────────────────────

pub async fn price(config: &AppConfig, watch: bool) -> Result<()> {
    let fetcher = Arc::new(price_fetcher(config)?);
    if !watch {
        println!("T99 price: {}", fetcher.fetch_price().await);
        return Ok(());
    }

    let ticker = PriceTicker::spawn(fetcher, config.price.refresh_interval());
    let mut rx = ticker.subscribe();
    println!("Refreshing every {}s. Ctrl-C to stop.", config.price.refresh_secs);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(p) = rx.borrow_and_update().clone() {
                    println!("[{}] T99 price: {p}", p.fetched_at.format("%Y-%m-%d %H:%M:%S"));
                }
            }
        }
    }
    Ok(())
}

// ── balance ──────────────────────────────────────────────────────────

pub async fn balance(config: &AppConfig, address: &str) -> Result<()> {
    let wallet = RpcWallet::connect(&config.sdk, &config.chain, Vec::new())?;
    let reader = TokenReader::new(Arc::new(wallet), config.token.clone())
        .with_balance_policy(config.balance_policy());

    let (balance, price) = tokio::join!(reader.read_balance(address), async {
        match price_fetcher(config) {
            Ok(f) => Some(f.fetch_price().await),
            Err(_) => None,
        }
    });
    let balance = balance.with_context(|| format!("reading balance of {address}"))?;

    println!("Token:    {} ({})", balance.name, balance.symbol);
    println!("Contract: {}", reader.token_address());
    println!("Balance:  {} {}", balance.display(), balance.symbol);
    println!("Raw:      {} ({} decimals)", balance.raw_amount, balance.decimals);
    if let Some(p) = price {
        println!("Price:    {p}");
        println!("Value:    ${}", usd_value(&balance.formatted_amount, p.usd_price));
    }
    Ok(())
}

// ── connect ──────────────────────────────────────────────────────────

pub async fn connect(config: &AppConfig, accounts: &[String], watch: bool) -> Result<()> {
    let accounts = accounts
        .iter()
        .map(|a| normalize_address(a))
        .collect::<Result<Vec<Address>, _>>()?;

    let host = HostEnvironment::bare();
    let resolved = provider::resolve(Some(&host), config.provider, || {
        let wallet = RpcWallet::connect(&config.sdk, &config.chain, accounts.clone())?;
        Ok(Arc::new(wallet) as Arc<dyn WalletProvider>)
    })?;
    println!("Provider: {} ({:?})", resolved.provider.info().name, resolved.kind);

    let flow = ConnectionFlow::new(resolved.provider, config);
    let mut events = flow.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let fetcher = Arc::new(price_fetcher(config)?);
    let ticker = PriceTicker::spawn(fetcher.clone(), config.price.refresh_interval());

    if !flow.restore().await {
        if let Err(e) = flow.connect().await {
            println!("Connection failed: {e}");
        }
    }
    let price = match ticker.latest() {
        Some(p) => p,
        None => fetcher.fetch_price().await,
    };
    print_summary(&flow.state(), &flow, &price);

    if watch && flow.state().is_connected() {
        println!("\nWatching session. Ctrl-C to disconnect.");
        let mut prices = ticker.subscribe();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = prices.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(p) = prices.borrow_and_update().clone() {
                        match flow.usd_value(&p) {
                            Some(v) => println!("  price {p}  value ${v}"),
                            None => println!("  price {p}"),
                        }
                    }
                }
            }
        }
    }

    flow.disconnect();
    drop(ticker);
    drop(flow);
    let _ = printer.await;
    Ok(())
}

// ── chain / config ───────────────────────────────────────────────────

pub fn chain(config: &AppConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&config.chain)?);
    Ok(())
}

pub fn show_config(config: &AppConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if let Some(path) = teth_wallet::config::default_path() {
        eprintln!("(config file location: {})", path.display());
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────

fn price_fetcher(config: &AppConfig) -> Result<PriceFetcher> {
    PriceFetcher::new(&config.price, &config.token.address.to_string())
}

fn print_event(event: &FlowEvent) {
    match event {
        FlowEvent::Step(step) => println!("  → {step}"),
        FlowEvent::Balance(Some(b)) => println!("  balance {} {}", b.display(), b.symbol),
        FlowEvent::Balance(None) => println!("  balance cleared"),
        FlowEvent::Error(msg) => println!("  ! {msg}"),
    }
}

fn print_summary(state: &WalletState, flow: &ConnectionFlow, price: &Price) {
    println!();
    println!("Step:     {}", state.step);
    if let Some(account) = &state.account {
        println!("Account:  {account}");
    }
    match state.chain_id {
        Some(id) if state.is_bsc() => println!("Network:  BNB Smart Chain ({id})"),
        Some(id) => println!("Network:  chain {id} (wrong network)"),
        None => println!("Network:  unknown"),
    }
    println!("Price:    {price}");
    match state.valid_balance() {
        Some(b) => {
            println!("Balance:  {} {}", b.display(), b.symbol);
            if let Some(v) = flow.usd_value(price) {
                println!("Value:    ${v}");
            }
        }
        None => println!("Balance:  0"),
    }
    if let Some(err) = &state.error {
        println!("Error:    {err}");
    }
}
