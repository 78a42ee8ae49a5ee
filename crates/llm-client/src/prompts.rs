use core_types::{MarketSnapshot, ParsedStrategy};

pub const PARSE_SYSTEM: &str = "You are a trading strategy analyst. You respond with a single JSON object and nothing else.";

pub const SIGNAL_SYSTEM: &str = "You are a disciplined crypto trading signal generator. You respond with a single JSON object and nothing else.";

pub const ROUND_SYSTEM: &str = "You extract trading game configurations from user requests. You respond with a single JSON object and nothing else.";

/// Prompt asking the model to structure a free-text strategy.
pub fn parse_strategy_prompt(text: &str) -> String {
    format!(
        r#"Analyze this trading strategy and return JSON with exactly these fields:
{{
  "strategy_type": "technical|fundamental|sentiment|mixed",
  "indicators": ["..."],
  "entry_conditions": "...",
  "exit_conditions": "...",
  "risk_management": "...",
  "timeframe": "...",
  "assets": ["SYMBOL", ...],
  "base_ecosystem": true,
  "clarity_score": 1-10,
  "actionable": true,
  "suggested_base_tokens": ["SYMBOL", ...]
}}

Strategy: "{}""#,
        text
    )
}

/// Prompt asking the model for a BUY/SELL/HOLD directive on one symbol.
pub fn generate_signal_prompt(snapshot: &MarketSnapshot, parsed: &ParsedStrategy) -> String {
    format!(
        r#"Market data for {symbol}:
- price: ${price}
- 24h change: {change}%
- 24h volume: ${volume}
- liquidity: ${liquidity}

Strategy type: {stype:?}
Entry conditions: {entry}
Exit conditions: {exit}
Risk management: {risk}
Timeframe: {timeframe}

Decide one action for {symbol} now. Return JSON with exactly these fields:
{{
  "signal": "BUY|SELL|HOLD",
  "confidence": 1-10,
  "reason": "...",
  "entry_price": number,
  "stop_loss": number,
  "take_profit": number,
  "risk_reward_ratio": number
}}
All price fields must be plain numbers, no expressions."#,
        symbol = snapshot.symbol,
        price = snapshot.price,
        change = snapshot.change_24h,
        volume = snapshot.volume_24h,
        liquidity = snapshot.liquidity,
        stype = parsed.strategy_type,
        entry = parsed.entry_conditions,
        exit = parsed.exit_conditions,
        risk = parsed.risk_management,
        timeframe = parsed.timeframe,
    )
}

/// Prompt asking the model to turn a natural-language request into a round
/// configuration.
pub fn parse_round_prompt(query: &str) -> String {
    format!(
        r#"Extract a trading game configuration from this request. Return JSON with exactly these fields (use null when the request does not say):
{{
  "title": "...",
  "description": "...",
  "tokens": ["SYMBOL", ...],
  "duration_secs": number,
  "starting_balance": number,
  "investment_amount": number,
  "target_profit_percent": number,
  "strategy": "...",
  "game_type": "...",
  "risk_level": "low|medium|high",
  "timeframe": "..."
}}

Request: "{}""#,
        query
    )
}
