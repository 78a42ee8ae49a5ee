//! The persisted key layout for rounds.

pub fn round(id: &str) -> String {
    format!("round:{}", id)
}

pub fn round_number(number: u64) -> String {
    format!("round:number:{}", number)
}

pub fn participants(round_id: &str) -> String {
    format!("round:{}:participants", round_id)
}

pub fn participant(round_id: &str, wallet: &str) -> String {
    format!("round:{}:participant:{}", round_id, wallet)
}

pub fn logs(round_id: &str, wallet: &str) -> String {
    format!("round:{}:logs:{}", round_id, wallet)
}

pub fn leaderboard(round_id: &str) -> String {
    format!("round:{}:leaderboard", round_id)
}

pub const ROUNDS_ACTIVE: &str = "rounds:active";
pub const ROUNDS_RUNNING: &str = "rounds:running";
pub const ROUNDS_FINISHED: &str = "rounds:finished";
pub const ROUND_COUNTER: &str = "round:counter";
