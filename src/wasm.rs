use crate::model::chain::ChainDescriptor;
use crate::model::token;
use crate::price::{TokenPairsResponse, price_from_response};
use wasm_bindgen::prelude::*;

/// Exact `raw / 10^decimals`, or an empty string for non-integer input.
#[wasm_bindgen]
pub fn format_token_amount(raw: &str, decimals: u8) -> String {
    token::format_units(raw, decimals).unwrap_or_default()
}

#[wasm_bindgen]
pub fn display_token_amount(formatted: &str) -> String {
    token::display_amount(formatted)
}

/// Pick the price out of a DexScreener `/latest/dex/tokens` body.
/// Returns `{"price": .., "source": "live"}` or the fallback with
/// `"source": "fallback"`.
#[wasm_bindgen]
pub fn select_price_json(body: &str, fallback_usd: f64) -> String {
    let live = serde_json::from_str::<TokenPairsResponse>(body)
        .map_err(anyhow::Error::from)
        .and_then(|resp| price_from_response(&resp));
    match live {
        Ok(price) => serde_json::json!({ "price": price, "source": "live" }).to_string(),
        Err(e) => serde_json::json!({
            "price": fallback_usd,
            "source": "fallback",
            "error": format!("{e:#}")
        })
        .to_string(),
    }
}

/// `wallet_addEthereumChain` parameters for BNB Smart Chain.
#[wasm_bindgen]
pub fn bsc_chain_json() -> String {
    serde_json::to_string(&ChainDescriptor::bsc()).unwrap_or_else(|e| {
        serde_json::json!({ "error": format!("Serialization error: {}", e) }).to_string()
    })
}
