use serde::Deserialize;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub llm: LlmSettings,
    pub market: MarketSettings,
    pub logging: LoggingSettings,
}

/// How strictly store failures are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Store failures surface as errors to the caller.
    Strict,
    /// Store failures downgrade to the in-memory backend with a warning.
    #[default]
    Permissive,
}

/// Connection settings for the external key-value store.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreSettings {
    /// Full connection URL (e.g. `redis://localhost:6379`). Takes precedence
    /// over host/port/password when set.
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub mode: StoreMode,
}

impl StoreSettings {
    /// Resolves the connection URL, composing one from host/port/password
    /// when no explicit URL was given. `None` means run in-memory only.
    pub fn connection_url(&self) -> Option<String> {
        if let Some(url) = &self.url {
            return Some(url.clone());
        }
        let host = self.host.as_ref()?;
        let port = self.port.unwrap_or(6379);
        Some(match &self.password {
            Some(pw) => format!("redis://:{}@{}:{}", pw, host, port),
            None => format!("redis://{}:{}", host, port),
        })
    }
}

/// Settings for the chat-completion client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Minimum spacing between consecutive upstream requests.
    pub min_interval_ms: u64,
    /// Delay after every request before the next queue pop.
    pub post_delay_ms: u64,
    /// Penalty sleep after an upstream 429.
    pub backoff_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            min_interval_ms: 2_000,
            post_delay_ms: 1_000,
            backoff_ms: 10_000,
            request_timeout_ms: 20_000,
        }
    }
}

/// Settings for the price feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    /// Per-symbol snapshot cache lifetime.
    pub price_cache_ttl_ms: u64,
    /// Target chain for the DEX aggregator filter.
    pub network: String,
    /// Minimum pool liquidity in USD for a DEX pair to be considered.
    pub min_liquidity: f64,
    pub request_timeout_ms: u64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            price_cache_ttl_ms: 30_000,
            network: "base".to_string(),
            min_liquidity: 10_000.0,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Tracing filter directive, e.g. "info" or "arena=debug,engine=trace".
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
