use chrono::Utc;
use core_types::{MarketSnapshot, Portfolio, Position, RoundSettings};
use std::collections::HashMap;

/// A trade below this fraction of free cash is not worth opening.
const MIN_POSITION_FRACTION: f64 = 0.05;

/// Fee rate applied when closing a position.
const SELL_FEE_RATE: f64 = 0.001;

/// The per-round trading policy applied to every simulated order.
#[derive(Debug, Clone, Copy)]
pub struct TradePolicy {
    /// Maximum fraction of free cash committed to a single position.
    pub max_position_size: f64,
    /// Fee rate debited when opening a position.
    pub trading_fee: f64,
}

impl From<&RoundSettings> for TradePolicy {
    fn from(settings: &RoundSettings) -> Self {
        Self {
            max_position_size: settings.max_position_size,
            trading_fee: settings.trading_fee,
        }
    }
}

/// Opens or tops up a position with a confidence-scaled slice of free cash.
///
/// Sizing: `cash × max_position_size × min(confidence/10, 1)`, evaluated
/// against pre-trade cash. The order is rejected (returns `false`) when the
/// sized value falls under the 5% minimum, or when value plus fee would
/// overdraw the cash balance. On success the fee and position value are
/// debited, the position's average entry is re-weighted, and the trade
/// counter advances.
pub fn apply_buy(
    portfolio: &mut Portfolio,
    symbol: &str,
    price: f64,
    confidence: u8,
    policy: &TradePolicy,
) -> bool {
    if price <= 0.0 || !price.is_finite() {
        return false;
    }

    let cash = portfolio.cash;
    let max_position_value = cash * policy.max_position_size;
    let position_value = max_position_value * (f64::from(confidence) / 10.0).min(1.0);

    if position_value < cash * MIN_POSITION_FRACTION {
        return false;
    }

    let fee = position_value * policy.trading_fee;
    if position_value + fee > cash {
        return false;
    }

    portfolio.cash -= position_value + fee;

    let amount = position_value / price;
    let position = portfolio
        .positions
        .entry(symbol.to_string())
        .or_insert_with(|| Position {
            symbol: symbol.to_string(),
            amount: 0.0,
            avg_entry_price: 0.0,
            total_invested: 0.0,
            current_value: 0.0,
            unrealized_pnl: 0.0,
        });

    position.total_invested += position_value;
    position.amount += amount;
    position.avg_entry_price = position.total_invested / position.amount;
    position.current_value = position.amount * price;
    position.unrealized_pnl = position.current_value - position.total_invested;

    portfolio.trades += 1;
    portfolio.last_update = Utc::now();
    true
}

/// Closes the entire position in `symbol` at `price`. Partial sells are not
/// supported. Returns `false` when there is nothing to sell.
pub fn apply_sell(portfolio: &mut Portfolio, symbol: &str, price: f64) -> bool {
    if price <= 0.0 || !price.is_finite() {
        return false;
    }

    let Some(position) = portfolio.positions.get(symbol) else {
        return false;
    };
    if position.amount <= 0.0 {
        // A zero-amount entry is a ghost; drop it rather than trade on it.
        portfolio.positions.remove(symbol);
        return false;
    }

    let sell_value = position.amount * price;
    let fee = sell_value * SELL_FEE_RATE;
    let proceeds = sell_value - fee;
    let realized = proceeds - position.total_invested;

    portfolio.cash += proceeds;
    portfolio.realized_pnl += realized;
    if realized > 0.0 {
        portfolio.wins += 1;
    } else {
        portfolio.losses += 1;
    }
    portfolio.positions.remove(symbol);

    portfolio.trades += 1;
    portfolio.last_update = Utc::now();
    true
}

/// Re-marks every open position at current prices and re-establishes the
/// derived portfolio fields. Positions whose symbol is missing from
/// `snapshots` keep their previous mark.
pub fn revalue(portfolio: &mut Portfolio, snapshots: &HashMap<String, MarketSnapshot>) {
    for position in portfolio.positions.values_mut() {
        if let Some(snapshot) = snapshots.get(&position.symbol) {
            position.current_value = position.amount * snapshot.price;
            position.unrealized_pnl = position.current_value - position.total_invested;
        }
    }

    let positions_value: f64 = portfolio.positions.values().map(|p| p.current_value).sum();
    portfolio.total_value = portfolio.cash + positions_value;
    portfolio.pnl_percent = if portfolio.starting_balance > 0.0 {
        (portfolio.total_value - portfolio.starting_balance) / portfolio.starting_balance * 100.0
    } else {
        0.0
    };
    portfolio.win_rate = if portfolio.trades > 0 {
        f64::from(portfolio.wins) / f64::from(portfolio.trades) * 100.0
    } else {
        0.0
    };
    portfolio.last_update = Utc::now();
}
