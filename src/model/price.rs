use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a [`Price`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Read from the pair-data API.
    Live,
    /// The configured constant, used whenever the live lookup fails.
    Fallback,
}

/// USD price of the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub usd_price: f64,
    pub source: PriceSource,
    pub fetched_at: DateTime<Utc>,
}

impl Price {
    pub fn live(usd_price: f64) -> Self {
        Price {
            usd_price,
            source: PriceSource::Live,
            fetched_at: Utc::now(),
        }
    }

    pub fn fallback(usd_price: f64) -> Self {
        Price {
            usd_price,
            source: PriceSource::Fallback,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == PriceSource::Fallback
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:.8}", self.usd_price)?;
        if self.is_fallback() {
            write!(f, " (fallback)")?;
        }
        Ok(())
    }
}
