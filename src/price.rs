use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::PriceConfig;
use crate::model::price::Price;

// ── API response types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TokenPairsResponse {
    #[serde(default)]
    pub pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
pub struct Pair {
    #[serde(rename = "pairAddress", default)]
    pub pair_address: Option<String>,
    #[serde(rename = "dexId", default)]
    pub dex_id: Option<String>,
    #[serde(rename = "priceUsd", default)]
    pub price_usd: Option<String>,
    #[serde(default)]
    pub liquidity: Option<Liquidity>,
}

#[derive(Debug, Deserialize)]
pub struct Liquidity {
    #[serde(default)]
    pub usd: Option<f64>,
}

impl Pair {
    fn liquidity_usd(&self) -> Option<f64> {
        self.liquidity.as_ref().and_then(|l| l.usd)
    }
}

// ── Pair selection ───────────────────────────────────────────────────

/// The pair with the highest USD liquidity. Ties, and pairs without a
/// liquidity figure, resolve to the earliest pair in response order.
pub fn best_pair(pairs: &[Pair]) -> Option<&Pair> {
    let mut best: Option<&Pair> = None;
    for pair in pairs {
        let better = match best {
            None => true,
            Some(current) => pair.liquidity_usd().unwrap_or(0.0) > current.liquidity_usd().unwrap_or(0.0),
        };
        if better {
            best = Some(pair);
        }
    }
    best
}

/// USD price from a pair-data response body.
pub fn price_from_response(body: &TokenPairsResponse) -> Result<f64> {
    let pairs = body.pairs.as_deref().unwrap_or_default();
    let Some(pair) = best_pair(pairs) else {
        bail!("no trading pairs listed");
    };
    let raw = pair.price_usd.as_deref().context("best pair has no priceUsd")?;
    let price: f64 = raw
        .parse()
        .with_context(|| format!("unparseable priceUsd `{raw}`"))?;
    if !price.is_finite() || price <= 0.0 {
        bail!("non-positive priceUsd `{raw}`");
    }
    debug!(pair = ?pair.pair_address, dex = ?pair.dex_id, price, "selected pair");
    Ok(price)
}

// ── Fetcher ──────────────────────────────────────────────────────────

/// Looks up the token's USD price, falling back to a constant.
pub struct PriceFetcher {
    client: reqwest::Client,
    url: String,
    fallback_usd: f64,
}

impl PriceFetcher {
    pub fn new(config: &PriceConfig, token: &str) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().user_agent(concat!("teth-wallet/", env!("CARGO_PKG_VERSION")));
        // zero means no deadline
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder.build().context("building price HTTP client")?;
        Ok(PriceFetcher {
            client,
            url: format!(
                "{}/latest/dex/tokens/{}",
                config.api_base.trim_end_matches('/'),
                token.to_lowercase()
            ),
            fallback_usd: config.fallback_usd,
        })
    }

    /// Current price. Never fails: any error yields the fallback price.
    pub async fn fetch_price(&self) -> Price {
        match self.fetch_live().await {
            Ok(usd) => {
                info!(usd, "price updated");
                Price::live(usd)
            }
            Err(e) => {
                warn!("price lookup failed, using fallback {}: {e:#}", self.fallback_usd);
                Price::fallback(self.fallback_usd)
            }
        }
    }

    async fn fetch_live(&self) -> Result<f64> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<TokenPairsResponse>()
            .await
            .context("decoding pair response")?;
        price_from_response(&body)
    }
}

#[async_trait]
impl PriceFeed for PriceFetcher {
    async fn fetch_price(&self) -> Price {
        PriceFetcher::fetch_price(self).await
    }
}

// ── Ticker ───────────────────────────────────────────────────────────

/// Source the ticker polls.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch_price(&self) -> Price;
}

/// Background refresh: fetches at once, then on every interval tick.
/// Dropping the ticker stops it.
pub struct PriceTicker {
    rx: watch::Receiver<Option<Price>>,
    handle: JoinHandle<()>,
}

impl PriceTicker {
    pub fn spawn(feed: Arc<dyn PriceFeed>, every: Duration) -> Self {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let price = feed.fetch_price().await;
                if tx.send(Some(price)).is_err() {
                    break;
                }
            }
        });
        PriceTicker { rx, handle }
    }

    /// Most recent price, `None` before the first lookup completes.
    pub fn latest(&self) -> Option<Price> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Price>> {
        self.rx.clone()
    }
}

impl Drop for PriceTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
