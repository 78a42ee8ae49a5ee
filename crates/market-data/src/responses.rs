use serde::Deserialize;
use std::collections::HashMap;

// Intermediate structs for deserializing the DEX aggregator response.

#[derive(Debug, Deserialize)]
pub struct DexTokenResponse {
    pub pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPair {
    pub chain_id: String,
    /// Price arrives as a decimal string.
    pub price_usd: Option<String>,
    #[serde(default)]
    pub price_change: DexPriceChange,
    #[serde(default)]
    pub volume: DexVolume,
    pub liquidity: Option<DexLiquidity>,
    /// Fully-diluted valuation; the aggregator's closest stand-in for market cap.
    pub fdv: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DexPriceChange {
    pub h24: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DexVolume {
    pub h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct DexLiquidity {
    pub usd: Option<f64>,
}

/// The spot endpoint keys its response by coin id:
/// `{ "ethereum": { "usd": 3000.0, "usd_24h_change": 1.2, ... } }`
pub type SpotResponse = HashMap<String, SpotQuote>;

#[derive(Debug, Deserialize)]
pub struct SpotQuote {
    pub usd: Option<f64>,
    pub usd_24h_change: Option<f64>,
    pub usd_24h_vol: Option<f64>,
    pub usd_market_cap: Option<f64>,
}
