use crate::enums::{SignalAction, StrategyType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The structured form of a natural-language trading strategy, produced by the
/// LLM parser. Every field is guaranteed present after schema repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStrategy {
    pub strategy_type: StrategyType,
    /// Indicator names the strategy references (e.g. "RSI", "volume").
    pub indicators: Vec<String>,
    pub entry_conditions: String,
    pub exit_conditions: String,
    pub risk_management: String,
    pub timeframe: String,
    /// Symbols the strategy names explicitly.
    pub assets: Vec<String>,
    /// Whether the strategy targets the Base token ecosystem.
    pub base_ecosystem: bool,
    /// How unambiguous the prose was, 1..=10.
    pub clarity_score: u8,
    /// Whether the strategy is concrete enough to trade on.
    pub actionable: bool,
    /// Symbols the parser suggests trading, in priority order. Preferred over
    /// `assets` when selecting candidates for a tick.
    pub suggested_base_tokens: Vec<String>,
}

impl Default for ParsedStrategy {
    /// The repaired fallback used when the model output cannot be salvaged.
    fn default() -> Self {
        Self {
            strategy_type: StrategyType::Mixed,
            indicators: vec!["price".to_string(), "volume".to_string()],
            entry_conditions: "momentum confirmation".to_string(),
            exit_conditions: "take profit or stop loss".to_string(),
            risk_management: "position sizing by confidence".to_string(),
            timeframe: "short".to_string(),
            assets: vec!["ETH".to_string()],
            base_ecosystem: true,
            clarity_score: 5,
            actionable: true,
            suggested_base_tokens: vec!["ETH".to_string()],
        }
    }
}

impl ParsedStrategy {
    /// Candidate symbols for one execution tick: the suggested list when the
    /// parser produced one, otherwise the explicitly named assets.
    pub fn candidate_symbols(&self) -> &[String] {
        if self.suggested_base_tokens.is_empty() {
            &self.assets
        } else {
            &self.suggested_base_tokens
        }
    }
}

/// An LLM-produced trading directive for one symbol.
///
/// After schema repair all price fields are positive finite numbers,
/// confidence is in 1..=10, and for a BUY the stop-loss sits below the entry
/// price with the take-profit above it (inverse for a SELL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    pub confidence: u8,
    pub reason: String,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward_ratio: f64,
}

/// Aggregate performance counters for a registered strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StrategyStats {
    pub total_uses: u64,
    pub total_earnings: f64,
    pub total_trades: u64,
    pub successful_trades: u64,
    pub win_rate: f64,
    pub best_performance: f64,
    pub average_return: f64,
}

/// A registered, marketplace-visible strategy owned by a wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Monotonic id assigned from the registry counter.
    pub id: u64,
    pub owner: String,
    /// The original natural-language text.
    pub text: String,
    pub parsed: ParsedStrategy,
    /// Royalty charged to licensees, percent in [5, 50].
    pub royalty_percent: f64,
    pub name: String,
    pub description: String,
    pub stats: StrategyStats,
    pub active: bool,
    pub verified: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A per-round permission for one wallet to trade with another wallet's
/// registered strategy. The royalty percent is captured at issuance so later
/// royalty changes on the source strategy do not retroactively alter it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub licensee: String,
    pub strategy_id: u64,
    pub round_id: String,
    pub strategy_owner: String,
    pub royalty_percent: f64,
    /// Profit shared to the licensor to date, virtual USD.
    pub profit_shared: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// The outcome of one round for a strategy, fed into its aggregate stats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub trades: u64,
    pub win: bool,
    /// Royalty earnings accrued to the owner, virtual USD.
    pub earnings: f64,
    /// The round return, percent.
    pub return_pct: f64,
}
