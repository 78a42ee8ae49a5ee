use core_types::{MarketSnapshot, ParsedStrategy, RoundPromptData, Signal, SignalAction, StrategyType};
use rand::Rng;
use serde_json::Value;

/// Default stop-loss distance when the model gave none, percent of entry.
const DEFAULT_STOP_PCT: f64 = 0.05;
/// Default take-profit distance, percent of entry.
const DEFAULT_TAKE_PCT: f64 = 0.10;
const DEFAULT_RISK_REWARD: f64 = 2.0;

/// Repairs a raw extracted signal object into a `Signal` that satisfies every
/// invariant: action in {BUY, SELL, HOLD}, confidence in 1..=10, all prices
/// positive, stop-loss and take-profit on the correct side of the entry.
///
/// `None` (nothing extractable) yields the full fallback signal.
pub fn repair_signal(value: Option<&Value>, snapshot: &MarketSnapshot) -> Signal {
    let Some(value) = value else {
        return fallback_signal(snapshot);
    };

    let action = value
        .get("signal")
        .or_else(|| value.get("action"))
        .and_then(Value::as_str)
        .map(SignalAction::from_raw)
        .unwrap_or(SignalAction::Hold);

    let confidence = match coerce_number(value.get("confidence"), snapshot.price) {
        Some(c) => (c.round() as i64).clamp(1, 10) as u8,
        None => fallback_confidence(),
    };

    let reason = value
        .get("reason")
        .and_then(Value::as_str)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or("no rationale provided")
        .to_string();

    let price = snapshot.price;
    let entry_price = coerce_number(value.get("entry_price"), price)
        .filter(|p| *p > 0.0)
        .unwrap_or(price);

    let (default_stop, default_take) = default_brackets(action, entry_price);
    let mut stop_loss = coerce_number(value.get("stop_loss"), price)
        .filter(|p| *p > 0.0)
        .unwrap_or(default_stop);
    let mut take_profit = coerce_number(value.get("take_profit"), price)
        .filter(|p| *p > 0.0)
        .unwrap_or(default_take);

    // A bracket on the wrong side of the entry is worse than no bracket.
    let brackets_sane = match action {
        SignalAction::Buy | SignalAction::Hold => stop_loss < entry_price && entry_price < take_profit,
        SignalAction::Sell => take_profit < entry_price && entry_price < stop_loss,
    };
    if !brackets_sane {
        stop_loss = default_stop;
        take_profit = default_take;
    }

    let risk_reward_ratio = coerce_number(value.get("risk_reward_ratio"), price)
        .filter(|r| *r > 0.0)
        .unwrap_or(DEFAULT_RISK_REWARD);

    Signal {
        action,
        confidence,
        reason,
        entry_price,
        stop_loss,
        take_profit,
        risk_reward_ratio,
    }
}

/// The signal used when the model output is beyond repair or the upstream
/// failed outright: a HOLD with mid-range confidence.
pub fn fallback_signal(snapshot: &MarketSnapshot) -> Signal {
    let price = snapshot.price;
    let (stop_loss, take_profit) = default_brackets(SignalAction::Hold, price);
    Signal {
        action: SignalAction::Hold,
        confidence: fallback_confidence(),
        reason: "signal unavailable, holding".to_string(),
        entry_price: price,
        stop_loss,
        take_profit,
        risk_reward_ratio: DEFAULT_RISK_REWARD,
    }
}

fn fallback_confidence() -> u8 {
    rand::thread_rng().gen_range(4..=8)
}

fn default_brackets(action: SignalAction, entry: f64) -> (f64, f64) {
    match action {
        SignalAction::Buy | SignalAction::Hold => {
            (entry * (1.0 - DEFAULT_STOP_PCT), entry * (1.0 + DEFAULT_TAKE_PCT))
        }
        SignalAction::Sell => {
            (entry * (1.0 + DEFAULT_STOP_PCT), entry * (1.0 - DEFAULT_TAKE_PCT))
        }
    }
}

/// Repairs a raw extracted strategy object into a complete `ParsedStrategy`.
pub fn repair_parsed(value: Option<&Value>) -> ParsedStrategy {
    let defaults = ParsedStrategy::default();
    let Some(value) = value else {
        return defaults;
    };

    let strategy_type = value
        .get("strategy_type")
        .and_then(Value::as_str)
        .map(|raw| match raw.trim().to_lowercase().as_str() {
            "technical" => StrategyType::Technical,
            "fundamental" => StrategyType::Fundamental,
            "sentiment" => StrategyType::Sentiment,
            _ => StrategyType::Mixed,
        })
        .unwrap_or(defaults.strategy_type);

    let clarity_score = coerce_number(value.get("clarity_score"), 0.0)
        .map(|c| (c.round() as i64).clamp(1, 10) as u8)
        .unwrap_or(defaults.clarity_score);

    ParsedStrategy {
        strategy_type,
        indicators: string_list(value.get("indicators"), &defaults.indicators, false),
        entry_conditions: string_field(value.get("entry_conditions"), &defaults.entry_conditions),
        exit_conditions: string_field(value.get("exit_conditions"), &defaults.exit_conditions),
        risk_management: string_field(value.get("risk_management"), &defaults.risk_management),
        timeframe: string_field(value.get("timeframe"), &defaults.timeframe),
        assets: string_list(value.get("assets"), &defaults.assets, true),
        base_ecosystem: value
            .get("base_ecosystem")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.base_ecosystem),
        clarity_score,
        actionable: value
            .get("actionable")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.actionable),
        suggested_base_tokens: string_list(
            value.get("suggested_base_tokens"),
            &defaults.suggested_base_tokens,
            true,
        ),
    }
}

/// Repairs a raw extracted round-request object. Unlike signals there are no
/// hard invariants here; absent fields stay `None` and the prompt-to-round
/// parser fills its defaults downstream.
pub fn repair_round_prompt(value: Option<&Value>) -> RoundPromptData {
    let Some(value) = value else {
        return RoundPromptData::default();
    };

    let opt_string = |key: &str| -> Option<String> {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let opt_number = |key: &str| coerce_number(value.get(key), 0.0).filter(|n| *n > 0.0);

    RoundPromptData {
        title: opt_string("title"),
        description: opt_string("description"),
        tokens: string_list(value.get("tokens"), &[], true),
        duration_secs: opt_number("duration_secs").map(|n| n as u64),
        starting_balance: opt_number("starting_balance"),
        investment_amount: opt_number("investment_amount"),
        target_profit_percent: opt_number("target_profit_percent"),
        strategy: opt_string("strategy"),
        game_type: opt_string("game_type"),
        risk_level: opt_string("risk_level"),
        timeframe: opt_string("timeframe"),
    }
}

fn string_field(value: Option<&Value>, default: &str) -> String {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

fn string_list(value: Option<&Value>, default: &[String], uppercase: bool) -> Vec<String> {
    let list: Vec<String> = value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    let s = s.trim();
                    if uppercase { s.to_uppercase() } else { s.to_string() }
                })
                .collect()
        })
        .unwrap_or_default();
    if list.is_empty() {
        default.to_vec()
    } else {
        list
    }
}

/// Coerces a JSON value to a number. Models return numbers as strings, and
/// sometimes as arithmetic over the current price ("3000 * 0.95",
/// "price * 1.05"); both forms are evaluated against `price`.
fn coerce_number(value: Option<&Value>, price: f64) -> Option<f64> {
    let value = value?;
    if let Some(n) = value.as_f64() {
        return n.is_finite().then_some(n);
    }

    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(n) = raw.parse::<f64>() {
        return n.is_finite().then_some(n);
    }
    eval_arithmetic(raw, price)
}

/// Evaluates a single binary operation `lhs op rhs` where either side may be
/// a number or a reference to the current price. Anything more elaborate is
/// not worth trusting.
fn eval_arithmetic(raw: &str, price: f64) -> Option<f64> {
    let term = |s: &str| -> Option<f64> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "price" | "current_price" | "entry_price" | "entry" => Some(price),
            _ => s.parse::<f64>().ok(),
        }
    };

    for op in ['*', '/', '+', '-'] {
        // Split on the operator, ignoring a leading sign.
        if let Some(pos) = raw[1..].find(op).map(|p| p + 1) {
            let lhs = term(&raw[..pos])?;
            let rhs = term(&raw[pos + 1..])?;
            let result = match op {
                '*' => lhs * rhs,
                '/' => (rhs != 0.0).then(|| lhs / rhs)?,
                '+' => lhs + rhs,
                '-' => lhs - rhs,
                _ => unreachable!(),
            };
            return result.is_finite().then_some(result);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::PriceSource;

    fn snapshot(price: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: "ETH".to_string(),
            price,
            change_24h: 0.0,
            volume_24h: 0.0,
            liquidity: 0.0,
            market_cap: 0.0,
            source: PriceSource::Mock,
            timestamp: Utc::now(),
        }
    }

    fn assert_invariants(signal: &Signal, price: f64) {
        assert!(signal.confidence >= 1 && signal.confidence <= 10);
        assert!(signal.entry_price > 0.0);
        assert!(signal.stop_loss > 0.0);
        assert!(signal.take_profit > 0.0);
        assert!(signal.risk_reward_ratio > 0.0);
        match signal.action {
            SignalAction::Buy | SignalAction::Hold => {
                assert!(signal.stop_loss < signal.entry_price);
                assert!(signal.entry_price < signal.take_profit);
            }
            SignalAction::Sell => {
                assert!(signal.take_profit < signal.entry_price);
                assert!(signal.entry_price < signal.stop_loss);
            }
        }
        let _ = price;
    }

    #[test]
    fn well_formed_signal_survives_intact() {
        let value = serde_json::json!({
            "signal": "BUY",
            "confidence": 8,
            "reason": "strong momentum",
            "entry_price": 3000.0,
            "stop_loss": 2850.0,
            "take_profit": 3300.0,
            "risk_reward_ratio": 2.0,
        });
        let signal = repair_signal(Some(&value), &snapshot(3000.0));
        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.confidence, 8);
        assert_eq!(signal.stop_loss, 2850.0);
        assert_invariants(&signal, 3000.0);
    }

    #[test]
    fn arithmetic_strings_are_evaluated() {
        let value = serde_json::json!({
            "signal": "BUY",
            "confidence": "7",
            "stop_loss": "3000 * 0.95",
            "take_profit": "price * 1.1",
        });
        let signal = repair_signal(Some(&value), &snapshot(3000.0));
        assert!((signal.stop_loss - 2850.0).abs() < 1e-9);
        assert!((signal.take_profit - 3300.0).abs() < 1e-9);
        assert_eq!(signal.confidence, 7);
        assert_invariants(&signal, 3000.0);
    }

    #[test]
    fn zero_prices_are_replaced_with_snapshot_price() {
        let value = serde_json::json!({
            "signal": "SELL",
            "confidence": 6,
            "entry_price": 0,
            "stop_loss": 0,
            "take_profit": 0,
        });
        let signal = repair_signal(Some(&value), &snapshot(100.0));
        assert_eq!(signal.entry_price, 100.0);
        assert_invariants(&signal, 100.0);
    }

    #[test]
    fn inverted_brackets_are_reset() {
        let value = serde_json::json!({
            "signal": "BUY",
            "confidence": 5,
            "entry_price": 100.0,
            "stop_loss": 120.0,
            "take_profit": 90.0,
        });
        let signal = repair_signal(Some(&value), &snapshot(100.0));
        assert_invariants(&signal, 100.0);
    }

    #[test]
    fn unknown_action_defaults_to_hold() {
        let value = serde_json::json!({"signal": "YOLO", "confidence": 99});
        let signal = repair_signal(Some(&value), &snapshot(50.0));
        assert_eq!(signal.action, SignalAction::Hold);
        assert_eq!(signal.confidence, 10);
        assert_invariants(&signal, 50.0);
    }

    #[test]
    fn nothing_extractable_yields_fallback_hold() {
        let signal = repair_signal(None, &snapshot(200.0));
        assert_eq!(signal.action, SignalAction::Hold);
        assert!(signal.confidence >= 4 && signal.confidence <= 8);
        assert_eq!(signal.entry_price, 200.0);
        assert_invariants(&signal, 200.0);
    }

    #[test]
    fn parsed_strategy_fields_fill_from_defaults() {
        let value = serde_json::json!({
            "strategy_type": "technical",
            "assets": ["eth", "toshi"],
            "clarity_score": 42,
        });
        let parsed = repair_parsed(Some(&value));
        assert_eq!(parsed.strategy_type, StrategyType::Technical);
        assert_eq!(parsed.assets, vec!["ETH", "TOSHI"]);
        assert_eq!(parsed.clarity_score, 10);
        assert!(!parsed.entry_conditions.is_empty());
        assert!(!parsed.suggested_base_tokens.is_empty());
    }

    #[test]
    fn parsed_strategy_from_nothing_is_the_default() {
        assert_eq!(repair_parsed(None), ParsedStrategy::default());
    }
}
