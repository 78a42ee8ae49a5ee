use serde::{Deserialize, Serialize};

/// The lifecycle state of a trading round.
///
/// `Finished` and `Cancelled` are terminal: no transition leaves them, and the
/// round record is kept only until its storage TTL expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Waiting,
    Active,
    Finished,
    Cancelled,
}

impl RoundStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundStatus::Finished | RoundStatus::Cancelled)
    }
}

/// The discrete trading directive produced by the LLM for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl serde::Serialize for SignalAction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            SignalAction::Buy => serializer.serialize_str("BUY"),
            SignalAction::Sell => serializer.serialize_str("SELL"),
            SignalAction::Hold => serializer.serialize_str("HOLD"),
        }
    }
}

impl<'de> serde::Deserialize<'de> for SignalAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(SignalAction::Buy),
            "SELL" => Ok(SignalAction::Sell),
            "HOLD" => Ok(SignalAction::Hold),
            _ => Err(serde::de::Error::custom(format!(
                "unknown signal action `{}`, expected BUY, SELL or HOLD",
                s
            ))),
        }
    }
}

impl SignalAction {
    /// Parses a raw model answer, defaulting to `Hold` when it is anything
    /// other than a recognizable BUY/SELL/HOLD.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "BUY" => SignalAction::Buy,
            "SELL" => SignalAction::Sell,
            _ => SignalAction::Hold,
        }
    }
}

/// The broad family a parsed strategy belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    Technical,
    Fundamental,
    Sentiment,
    #[default]
    Mixed,
}

/// Where a market snapshot came from. `Mock` snapshots are synthetic data used
/// when every upstream feed failed; tests and clients key off this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Dex,
    Spot,
    Mock,
}
