use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use teth_wallet::config::{DEFAULT_FALLBACK_PRICE, PriceConfig, TETH_CONTRACT_ADDRESS};
use teth_wallet::model::{Price, PriceSource};
use teth_wallet::price::{PriceFeed, PriceFetcher, PriceTicker};

const TOKEN_PATH: &str = "/latest/dex/tokens/0xc98cf0876b23fb1f574be5c59e4217c80b34d327";

const PAIRS: &str = r#"{"schemaVersion":"1.0.0","pairs":[
    {"dexId":"pancakeswap","pairAddress":"0xaaa","priceUsd":"0.00012","liquidity":{"usd":1500.5}},
    {"dexId":"pancakeswap","pairAddress":"0xbbb","priceUsd":"0.00016","liquidity":{"usd":42000.0}},
    {"dexId":"biswap","pairAddress":"0xccc","priceUsd":"0.00019"}
]}"#;

/// Pair API answering `status` + `body` on the token path.
async fn serve(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body.to_owned(), "application/json"))
        .mount(&server)
        .await;
    server
}

fn config(api_base: &str) -> PriceConfig {
    PriceConfig {
        api_base: api_base.to_string(),
        timeout_secs: 5,
        ..PriceConfig::default()
    }
}

fn fetcher(api_base: &str) -> PriceFetcher {
    PriceFetcher::new(&config(api_base), &TETH_CONTRACT_ADDRESS.to_string()).unwrap()
}

async fn requests(server: &MockServer) -> usize {
    server.received_requests().await.map_or(0, |r| r.len())
}

/// Counts lookups and answers the count as the price.
#[derive(Default)]
struct CountingFeed {
    calls: AtomicUsize,
}

impl CountingFeed {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFeed for CountingFeed {
    async fn fetch_price(&self) -> Price {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Price::live(n as f64)
    }
}

// ── Fetcher ──────────────────────────────────────────────────────────

#[tokio::test]
async fn live_price_comes_from_deepest_pair() {
    let server = serve(200, PAIRS).await;
    let price = fetcher(&server.uri()).fetch_price().await;

    assert_eq!(price.source, PriceSource::Live);
    assert_eq!(price.usd_price, 0.00016);
    assert_eq!(requests(&server).await, 1);
}

#[tokio::test]
async fn mixed_case_token_is_requested_lower_case() {
    let server = serve(200, PAIRS).await;
    let config = config(&server.uri());
    let fetcher = PriceFetcher::new(&config, "0xC98CF0876B23FB1F574BE5C59E4217C80B34D327").unwrap();

    let price = fetcher.fetch_price().await;

    // only the lower-case path is mounted
    assert_eq!(price.source, PriceSource::Live);
    let seen = server.received_requests().await.unwrap();
    assert_eq!(seen[0].url.path(), TOKEN_PATH);
}

#[tokio::test]
async fn zero_timeout_means_no_deadline() {
    let server = serve(200, PAIRS).await;
    let config = PriceConfig {
        api_base: server.uri(),
        timeout_secs: 0,
        ..PriceConfig::default()
    };
    let fetcher = PriceFetcher::new(&config, &TETH_CONTRACT_ADDRESS.to_string()).unwrap();

    let price = fetcher.fetch_price().await;
    assert_eq!(price.source, PriceSource::Live);
    assert_eq!(price.usd_price, 0.00016);
}

#[tokio::test]
async fn unreachable_api_uses_fallback() {
    // Nothing listens on port 1.
    let price = fetcher("http://127.0.0.1:1").fetch_price().await;
    assert!(price.is_fallback());
    assert_eq!(price.usd_price, DEFAULT_FALLBACK_PRICE);
    assert_eq!(price.usd_price, 0.0001395);
}

#[tokio::test]
async fn http_error_uses_fallback() {
    let server = serve(503, r#"{"error":"busy"}"#).await;
    let price = fetcher(&server.uri()).fetch_price().await;
    assert!(price.is_fallback());
}

#[tokio::test]
async fn unknown_path_uses_fallback() {
    let server = MockServer::start().await;
    let price = fetcher(&server.uri()).fetch_price().await;
    assert!(price.is_fallback());
}

#[tokio::test]
async fn empty_pairs_use_fallback() {
    let server = serve(200, r#"{"schemaVersion":"1.0.0","pairs":null}"#).await;
    let price = fetcher(&server.uri()).fetch_price().await;
    assert!(price.is_fallback());
    assert_eq!(price.to_string(), "$0.00013950 (fallback)");
}

#[tokio::test]
async fn malformed_body_uses_fallback() {
    let server = serve(200, "<html>not json</html>").await;
    let price = fetcher(&server.uri()).fetch_price().await;
    assert!(price.is_fallback());
}

// ── Ticker ───────────────────────────────────────────────────────────

#[tokio::test]
async fn ticker_publishes_first_price_immediately() {
    let server = serve(200, PAIRS).await;
    let ticker = PriceTicker::spawn(Arc::new(fetcher(&server.uri())), Duration::from_secs(60));
    assert!(ticker.latest().is_none());

    let mut rx = ticker.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("no price within 5s")
        .unwrap();

    let price = ticker.latest().unwrap();
    assert_eq!(price.usd_price, 0.00016);
    assert_eq!(requests(&server).await, 1);
}

#[tokio::test(start_paused = true)]
async fn ticker_refetches_every_refresh_interval() {
    let every = PriceConfig::default().refresh_interval();
    assert_eq!(every, Duration::from_secs(30));

    let feed = Arc::new(CountingFeed::default());
    let ticker = PriceTicker::spawn(feed.clone(), every);
    let mut rx = ticker.subscribe();
    let start = Instant::now();

    rx.changed().await.unwrap();
    assert_eq!(feed.calls(), 1);
    assert!(start.elapsed() < every);

    rx.changed().await.unwrap();
    assert_eq!(feed.calls(), 2);
    assert!(start.elapsed() >= every);
    assert_eq!(ticker.latest().unwrap().usd_price, 2.0);
}

#[tokio::test]
async fn ticker_hits_the_api_again_after_the_interval() {
    let server = serve(200, PAIRS).await;
    let ticker = PriceTicker::spawn(Arc::new(fetcher(&server.uri())), Duration::from_secs(1));
    let mut rx = ticker.subscribe();

    tokio::time::timeout(Duration::from_secs(10), async {
        rx.changed().await.unwrap();
        rx.changed().await.unwrap();
    })
    .await
    .expect("no second price within 10s");

    assert!(requests(&server).await >= 2);
    assert_eq!(ticker.latest().unwrap().usd_price, 0.00016);
}

#[tokio::test]
async fn dropping_the_ticker_closes_subscribers() {
    let ticker = PriceTicker::spawn(Arc::new(CountingFeed::default()), Duration::from_secs(60));
    let mut rx = ticker.subscribe();
    drop(ticker);

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
