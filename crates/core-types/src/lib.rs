pub mod enums;
pub mod leaderboard;
pub mod market;
pub mod participant;
pub mod portfolio;
pub mod round;
pub mod strategy;

// Re-export the core types to provide a clean public API.
pub use enums::{PriceSource, RoundStatus, SignalAction, StrategyType};
pub use leaderboard::{EnhancedLeaderboardEntry, LeaderboardEntry};
pub use market::MarketSnapshot;
pub use participant::{Participant, StrategyBinding, TradeLogEntry};
pub use portfolio::{Portfolio, Position};
pub use round::{Round, RoundPromptData, RoundSettings, RoundStats};
pub use strategy::{License, ParsedStrategy, Signal, Strategy, StrategyOutcome, StrategyStats};
