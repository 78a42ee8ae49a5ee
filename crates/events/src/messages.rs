use chrono::{DateTime, Utc};
use core_types::LeaderboardEntry;
use serde::{Deserialize, Serialize};

/// The top-level event enum published on the bus.
///
/// The `#[serde(tag = "type", content = "payload")]` attribute serializes each
/// variant into a clean JSON object that the push transport can relay to its
/// clients verbatim, e.g.:
/// `{ "type": "leaderboard_update", "payload": { "round_id": "...", ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum GameEvent {
    /// A round was created and is open for joins.
    RoundCreated {
        round_id: String,
        number: u64,
        title: String,
        max_participants: u32,
    },
    /// A wallet joined a round.
    ParticipantJoined {
        round_id: String,
        wallet: String,
        username: String,
        total_participants: u32,
    },
    /// A round transitioned to active and its scheduler is running.
    RoundStarted {
        round_id: String,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    },
    /// A round reached its deadline or was ended by an administrator.
    RoundEnded {
        round_id: String,
        leaderboard: Vec<LeaderboardEntry>,
    },
    LeaderboardUpdate {
        round_id: String,
        entries: Vec<LeaderboardEntry>,
    },
}

impl GameEvent {
    /// The round this event concerns.
    pub fn round_id(&self) -> &str {
        match self {
            GameEvent::RoundCreated { round_id, .. } => round_id,
            GameEvent::ParticipantJoined { round_id, .. } => round_id,
            GameEvent::RoundStarted { round_id, .. } => round_id,
            GameEvent::RoundEnded { round_id, .. } => round_id,
            GameEvent::LeaderboardUpdate { round_id, .. } => round_id,
        }
    }
}
