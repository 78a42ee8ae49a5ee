//! Leaderboard maintenance and the derived profit score.

use crate::{keys, EngineError, RoundManager};
use core_types::{EnhancedLeaderboardEntry, LeaderboardEntry, Participant, Round};

/// Letter grade for a profit score (`actual% / expected%`).
pub fn grade_for(score: f64) -> &'static str {
    if score >= 1.5 {
        "S"
    } else if score >= 1.0 {
        "A"
    } else if score >= 0.7 {
        "B"
    } else if score >= 0.4 {
        "C"
    } else if score > 0.0 {
        "D"
    } else {
        "F"
    }
}

fn entry_for(rank: u32, participant: &Participant) -> LeaderboardEntry {
    let pf = &participant.portfolio;
    LeaderboardEntry {
        rank,
        wallet: participant.wallet.clone(),
        username: participant.username.clone(),
        pnl: pf.total_value - pf.starting_balance,
        pnl_percentage: pf.pnl_percent,
        total_value: pf.total_value,
        trades: pf.trades,
        win_rate: pf.win_rate,
    }
}

impl RoundManager {
    /// Rebuilds the round's sorted set from scratch and returns the full
    /// ranked listing. Participants that failed to load are simply absent.
    pub(crate) async fn rebuild_leaderboard(
        &self,
        round: &Round,
    ) -> Result<Vec<LeaderboardEntry>, EngineError> {
        let mut participants = self.load_participants(&round.id).await?;
        let key = keys::leaderboard(&round.id);
        self.store().del(&key).await?;
        for participant in &participants {
            self.store()
                .zadd(&key, &participant.wallet, participant.portfolio.pnl_percent)
                .await?;
        }
        self.store().expire(&key, crate::round_ttl(round)).await?;

        participants.sort_by(|a, b| {
            b.portfolio
                .pnl_percent
                .partial_cmp(&a.portfolio.pnl_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.wallet.cmp(&b.wallet))
        });
        Ok(participants
            .iter()
            .enumerate()
            .map(|(i, p)| entry_for(i as u32 + 1, p))
            .collect())
    }

    /// Reads the persisted leaderboard, top `limit` entries with stable rank
    /// numbering from 1.
    pub async fn leaderboard(
        &self,
        round_id: &str,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, EngineError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        // Probe existence first so an unknown round is an error, not an empty
        // list.
        let _ = self.get_round(round_id).await?;

        let ranked = self
            .store()
            .zrevrange_withscores(&keys::leaderboard(round_id), 0, limit as isize - 1)
            .await?;

        let mut entries = Vec::with_capacity(ranked.len());
        for (i, (wallet, _score)) in ranked.iter().enumerate() {
            match self.get_participant(round_id, wallet).await {
                Ok(participant) => entries.push(entry_for(i as u32 + 1, &participant)),
                Err(err) => {
                    tracing::warn!(
                        round_id = %round_id,
                        wallet = %wallet,
                        error = %err,
                        "leaderboard entry without participant record"
                    );
                }
            }
        }
        Ok(entries)
    }

    /// The leaderboard extended with profit scores and grades.
    pub async fn enhanced_leaderboard(
        &self,
        round_id: &str,
        limit: usize,
    ) -> Result<Vec<EnhancedLeaderboardEntry>, EngineError> {
        let round = self.get_round(round_id).await?;
        let expected = round.settings.expected_profit_percent;
        let entries = self.leaderboard(round_id, limit).await?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                let profit_score = if expected > 0.0 {
                    entry.pnl_percentage / expected
                } else {
                    entry.pnl_percentage
                };
                EnhancedLeaderboardEntry {
                    grade: grade_for(profit_score).to_string(),
                    profit_score,
                    entry,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades_cover_the_scale() {
        assert_eq!(grade_for(2.0), "S");
        assert_eq!(grade_for(1.0), "A");
        assert_eq!(grade_for(0.8), "B");
        assert_eq!(grade_for(0.5), "C");
        assert_eq!(grade_for(0.1), "D");
        assert_eq!(grade_for(0.0), "F");
        assert_eq!(grade_for(-1.2), "F");
    }
}
