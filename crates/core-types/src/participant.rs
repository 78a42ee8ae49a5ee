use crate::enums::SignalAction;
use crate::portfolio::Portfolio;
use crate::strategy::ParsedStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a participant's strategy was obtained. Exactly one variant per
/// participant per round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StrategyBinding {
    /// Free-text strategy parsed at join time.
    Inline { parsed: ParsedStrategy },
    /// A registered strategy owned by the joiner.
    Owned {
        strategy_id: u64,
        parsed: ParsedStrategy,
    },
    /// Another wallet's registered strategy, used under license. Carries the
    /// royalty captured when the license was issued.
    Licensed {
        strategy_id: u64,
        owner: String,
        royalty_percent: f64,
        parsed: ParsedStrategy,
    },
}

impl StrategyBinding {
    /// The working parsed strategy, whichever variant it came from.
    pub fn parsed(&self) -> &ParsedStrategy {
        match self {
            StrategyBinding::Inline { parsed } => parsed,
            StrategyBinding::Owned { parsed, .. } => parsed,
            StrategyBinding::Licensed { parsed, .. } => parsed,
        }
    }

    /// The registered strategy id behind this binding, if any.
    pub fn strategy_id(&self) -> Option<u64> {
        match self {
            StrategyBinding::Inline { .. } => None,
            StrategyBinding::Owned { strategy_id, .. } => Some(*strategy_id),
            StrategyBinding::Licensed { strategy_id, .. } => Some(*strategy_id),
        }
    }

    pub fn is_licensed(&self) -> bool {
        matches!(self, StrategyBinding::Licensed { .. })
    }
}

/// A wallet bound to a round with a strategy and a virtual portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub round_id: String,
    /// Wallet address; the participant's identity within the round.
    pub wallet: String,
    pub username: String,
    pub binding: StrategyBinding,
    pub portfolio: Portfolio,
    pub joined_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub active: bool,
}

/// One line of a participant's per-round trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: SignalAction,
    pub price: f64,
    pub confidence: u8,
    pub reason: String,
    /// Whether the signal actually moved the portfolio (a HOLD, a rejected
    /// sizing check or a sell without a position all record `false`).
    pub executed: bool,
}
