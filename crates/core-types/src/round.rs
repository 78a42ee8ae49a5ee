use crate::enums::RoundStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tunables attached to a round at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSettings {
    /// Strategy execution cadence, milliseconds.
    pub execution_interval_ms: u64,
    /// Maximum fraction of free cash committed to a single position.
    pub max_position_size: f64,
    /// Fee rate applied to both sides of every simulated trade.
    pub trading_fee: f64,
    /// Symbols participants may trade this round. Empty means the price-feed
    /// whitelist applies unrestricted.
    pub allowed_tokens: Vec<String>,
    /// Start automatically (after a short grace delay) once the round fills.
    pub auto_start: bool,
    /// Expected round return, percent. Denominator of the profit score.
    pub expected_profit_percent: f64,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            execution_interval_ms: 15_000,
            max_position_size: 0.3,
            trading_fee: 0.001,
            allowed_tokens: Vec::new(),
            auto_start: true,
            expected_profit_percent: 5.0,
        }
    }
}

/// Aggregated counters maintained by the round manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RoundStats {
    pub total_participants: u32,
    /// Trades executed across all participants, settled at round end.
    pub total_trades: u64,
}

/// A time-boxed, multi-participant simulated-trading session.
///
/// Created in `Waiting`; mutated only by the round manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub id: String,
    /// Monotonic round number from the store counter.
    pub number: u64,
    pub title: String,
    pub description: String,
    pub duration_ms: i64,
    /// Virtual USD every participant starts with.
    pub starting_balance: f64,
    pub min_participants: u32,
    pub max_participants: u32,
    pub settings: RoundSettings,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub stats: RoundStats,
    /// Set once the auto-start timer has been armed, so filling the round a
    /// second time (join after leave) cannot arm it again.
    #[serde(default)]
    pub autostart_armed: bool,
}

impl Round {
    /// The wall-clock deadline, defined only once the round has started.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.end_at
    }

    pub fn is_full(&self) -> bool {
        self.stats.total_participants >= self.max_participants
    }

    /// Storage TTL: the round outlives its deadline by one hour.
    pub fn ttl(&self) -> Duration {
        Duration::milliseconds(self.duration_ms) + Duration::hours(1)
    }

    /// Whether `symbol` may be traded in this round.
    pub fn allows_token(&self, symbol: &str) -> bool {
        self.settings.allowed_tokens.is_empty()
            || self.settings.allowed_tokens.iter().any(|t| t == symbol)
    }
}

/// The fields the LLM extracts from a natural-language round request. Every
/// field is optional; the prompt-to-round parser fills defaults before the
/// configuration reaches `CreateRound`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RoundPromptData {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tokens: Vec<String>,
    pub duration_secs: Option<u64>,
    pub starting_balance: Option<f64>,
    pub investment_amount: Option<f64>,
    pub target_profit_percent: Option<f64>,
    pub strategy: Option<String>,
    pub game_type: Option<String>,
    pub risk_level: Option<String>,
    pub timeframe: Option<String>,
}
