use crate::enums::PriceSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A market-data record for one symbol at an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    /// Current price in USD.
    pub price: f64,
    /// 24h price change, percent.
    pub change_24h: f64,
    /// 24h traded volume, USD.
    pub volume_24h: f64,
    /// Pool liquidity, USD. Zero when the source does not report it.
    pub liquidity: f64,
    /// Market capitalization, USD. Zero when the source does not report it.
    pub market_cap: f64,
    pub source: PriceSource,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn is_mock(&self) -> bool {
        self.source == PriceSource::Mock
    }
}
