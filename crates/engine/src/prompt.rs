//! Turning a natural-language request into a round configuration.
//!
//! The LLM extraction happens in the LLM client; this module merges the
//! extracted fields with caller overrides and the stock defaults before the
//! result reaches `CreateRound`.

use crate::RoundConfig;
use core_types::RoundPromptData;
use serde::{Deserialize, Serialize};

/// Tokens a prompted round trades when neither the request nor the caller
/// names any.
const DEFAULT_PROMPT_TOKENS: [&str; 3] = ["ETH", "TOSHI", "DEGEN"];

const DEFAULT_PROMPT_DURATION_SECS: u64 = 300;
const DEFAULT_PROMPT_BALANCE: f64 = 10_000.0;
const DEFAULT_PROMPT_TARGET_PCT: f64 = 5.0;

/// Caller-supplied overrides for `create-game-from-prompt`. Overrides beat
/// extracted values, which beat defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOverrides {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_secs: Option<u64>,
    pub starting_balance: Option<f64>,
    pub min_participants: Option<u32>,
    pub max_participants: Option<u32>,
    pub execution_interval_secs: Option<u64>,
    pub allowed_tokens: Option<Vec<String>>,
    pub auto_start: Option<bool>,
}

pub fn round_config_from_prompt(
    extracted: &RoundPromptData,
    overrides: &PromptOverrides,
) -> RoundConfig {
    let defaults = RoundConfig::default();

    let tokens = overrides
        .allowed_tokens
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| {
            (!extracted.tokens.is_empty()).then(|| extracted.tokens.clone())
        })
        .unwrap_or_else(|| {
            DEFAULT_PROMPT_TOKENS
                .iter()
                .map(|t| t.to_string())
                .collect()
        });

    RoundConfig {
        title: overrides
            .title
            .clone()
            .or_else(|| extracted.title.clone())
            .unwrap_or(defaults.title),
        description: overrides
            .description
            .clone()
            .or_else(|| extracted.description.clone())
            .or_else(|| extracted.strategy.clone())
            .unwrap_or(defaults.description),
        duration_secs: overrides
            .duration_secs
            .or(extracted.duration_secs)
            .unwrap_or(DEFAULT_PROMPT_DURATION_SECS),
        starting_balance: overrides
            .starting_balance
            .or(extracted.starting_balance)
            .unwrap_or(DEFAULT_PROMPT_BALANCE),
        min_participants: overrides.min_participants.unwrap_or(defaults.min_participants),
        max_participants: overrides.max_participants.unwrap_or(defaults.max_participants),
        execution_interval_secs: overrides
            .execution_interval_secs
            .unwrap_or(defaults.execution_interval_secs),
        allowed_tokens: tokens,
        auto_start: overrides.auto_start.unwrap_or(defaults.auto_start),
        expected_profit_percent: extracted
            .target_profit_percent
            .unwrap_or(DEFAULT_PROMPT_TARGET_PCT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_extraction_yields_stock_defaults() {
        let config =
            round_config_from_prompt(&RoundPromptData::default(), &PromptOverrides::default());
        assert_eq!(config.duration_secs, 300);
        assert_eq!(config.starting_balance, 10_000.0);
        assert_eq!(config.allowed_tokens, vec!["ETH", "TOSHI", "DEGEN"]);
        assert_eq!(config.expected_profit_percent, 5.0);
    }

    #[test]
    fn extracted_fields_beat_defaults() {
        let extracted = RoundPromptData {
            title: Some("Degen hour".to_string()),
            tokens: vec!["DEGEN".to_string()],
            duration_secs: Some(600),
            starting_balance: Some(5_000.0),
            target_profit_percent: Some(12.0),
            ..Default::default()
        };
        let config = round_config_from_prompt(&extracted, &PromptOverrides::default());
        assert_eq!(config.title, "Degen hour");
        assert_eq!(config.allowed_tokens, vec!["DEGEN"]);
        assert_eq!(config.duration_secs, 600);
        assert_eq!(config.starting_balance, 5_000.0);
        assert_eq!(config.expected_profit_percent, 12.0);
    }

    #[test]
    fn overrides_beat_extraction() {
        let extracted = RoundPromptData {
            duration_secs: Some(600),
            tokens: vec!["DEGEN".to_string()],
            ..Default::default()
        };
        let overrides = PromptOverrides {
            duration_secs: Some(120),
            allowed_tokens: Some(vec!["ETH".to_string()]),
            max_participants: Some(4),
            ..Default::default()
        };
        let config = round_config_from_prompt(&extracted, &overrides);
        assert_eq!(config.duration_secs, 120);
        assert_eq!(config.allowed_tokens, vec!["ETH"]);
        assert_eq!(config.max_participants, 4);
    }
}
