use serde::{Deserialize, Serialize};

/// One row of a round leaderboard, ranked by percent P&L descending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based rank after sorting.
    pub rank: u32,
    pub wallet: String,
    pub username: String,
    /// Absolute P&L versus starting balance, virtual USD.
    pub pnl: f64,
    pub pnl_percentage: f64,
    pub total_value: f64,
    pub trades: u32,
    pub win_rate: f64,
}

/// A leaderboard row extended with the profit score (`actual% / expected%`)
/// and its letter grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedLeaderboardEntry {
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
    pub profit_score: f64,
    pub grade: String,
}
