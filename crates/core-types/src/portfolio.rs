use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Holdings of one symbol within a virtual portfolio.
///
/// A position with `amount == 0` must never be persisted; the accounting
/// removes it from the map when it is fully closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Token amount held. Always > 0 for a live position.
    pub amount: f64,
    /// Volume-weighted average entry price in USD.
    pub avg_entry_price: f64,
    /// Total USD spent opening the position (excluding fees).
    pub total_invested: f64,
    /// Mark value at the last revaluation.
    pub current_value: f64,
    /// Unrealized P&L at the last revaluation.
    pub unrealized_pnl: f64,
}

/// The virtual trading account of one participant, valued in virtual USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    /// Free cash. Non-negative on every exit path of the accounting.
    pub cash: f64,
    pub starting_balance: f64,
    pub positions: HashMap<String, Position>,
    /// Cash plus mark value of all positions, re-established on revaluation.
    pub total_value: f64,
    /// Cumulative realized P&L from closed positions, net of fees.
    pub realized_pnl: f64,
    /// Total value versus starting balance, percent.
    pub pnl_percent: f64,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    /// wins / trades, percent. Zero until the first trade.
    pub win_rate: f64,
    pub last_update: DateTime<Utc>,
}

impl Portfolio {
    /// Creates a fresh portfolio holding only cash.
    pub fn new(starting_balance: f64) -> Self {
        Self {
            cash: starting_balance,
            starting_balance,
            positions: HashMap::new(),
            total_value: starting_balance,
            realized_pnl: 0.0,
            pnl_percent: 0.0,
            trades: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            last_update: Utc::now(),
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }
}
