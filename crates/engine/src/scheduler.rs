//! The per-round periodic execution task.
//!
//! One long-lived task per active round. Ticks are fixed-delay: the next
//! sleep starts only after the previous tick has fully completed, so in-flight
//! work is bounded no matter how slow the LLM queue is.

use crate::{keys, EngineError, RoundManager};
use chrono::Utc;
use core_types::{Participant, Round, RoundStatus, SignalAction, TradeLogEntry};
use events::GameEvent;
use executor::TradePolicy;
use futures::StreamExt;
use std::time::Duration;

/// Upper bound on concurrently executing participants within a tick.
const MAX_CONCURRENCY: usize = 10;

/// At most this many candidate symbols are considered per participant per
/// tick, taken from the head of the strategy's suggestion list.
const MAX_SYMBOLS_PER_TICK: usize = 3;

/// How many leaderboard rows ride on each `leaderboard_update` event.
const PUBLISH_TOP_N: usize = 10;

impl RoundManager {
    /// Launches the execution loop for an active round.
    pub(crate) fn spawn_scheduler(&self, round_id: String) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_round_loop(&round_id).await;
            tracing::info!(round_id = %round_id, "execution scheduler stopped");
        });
    }

    async fn run_round_loop(&self, round_id: &str) {
        tracing::info!(round_id = %round_id, "execution scheduler started");
        loop {
            let round = match self.get_round(round_id).await {
                Ok(round) => round,
                Err(err) => {
                    tracing::warn!(round_id = %round_id, error = %err, "round unloadable, stopping scheduler");
                    return;
                }
            };
            if round.status != RoundStatus::Active {
                return;
            }

            tokio::time::sleep(Duration::from_millis(round.settings.execution_interval_ms)).await;

            // Re-read: the round may have been ended while we slept.
            let round = match self.get_round(round_id).await {
                Ok(round) => round,
                Err(_) => return,
            };
            if round.status != RoundStatus::Active {
                return;
            }
            if let Some(end_at) = round.deadline() {
                if Utc::now() >= end_at {
                    if let Err(err) = self.end_round(round_id).await {
                        tracing::warn!(round_id = %round_id, error = %err, "deadline end failed");
                    }
                    return;
                }
            }

            self.execute_tick(&round).await;
        }
    }

    /// One tick: fan out across participants, then rebuild and publish the
    /// leaderboard. No participant failure aborts the tick, and the publish
    /// is suppressed if the round stopped being active mid-tick.
    pub(crate) async fn execute_tick(&self, round: &Round) {
        let wallets = match self.store().smembers(&keys::participants(&round.id)).await {
            Ok(wallets) => wallets,
            Err(err) => {
                tracing::warn!(round_id = %round.id, error = %err, "cannot snapshot participants, skipping tick");
                return;
            }
        };
        if wallets.is_empty() {
            return;
        }

        let concurrency = wallets.len().min(MAX_CONCURRENCY);
        futures::stream::iter(wallets)
            .for_each_concurrent(concurrency, |wallet| async move {
                if let Err(err) = self.execute_participant(round, &wallet).await {
                    tracing::warn!(
                        round_id = %round.id,
                        wallet = %wallet,
                        error = %err,
                        "participant execution failed, continuing tick"
                    );
                }
            })
            .await;

        // Post-tick publish, under the round mutex so it cannot interleave
        // with EndRound's final leaderboard.
        let lock = self.round_lock(&round.id).await;
        let _guard = lock.lock().await;
        match self.get_round(&round.id).await {
            Ok(current) if current.status == RoundStatus::Active => {
                match self.rebuild_leaderboard(&current).await {
                    Ok(mut entries) => {
                        entries.truncate(PUBLISH_TOP_N);
                        self.bus().publish(GameEvent::LeaderboardUpdate {
                            round_id: round.id.clone(),
                            entries,
                        });
                    }
                    Err(err) => {
                        tracing::warn!(round_id = %round.id, error = %err, "leaderboard rebuild failed");
                    }
                }
            }
            _ => {
                tracing::debug!(round_id = %round.id, "round no longer active, suppressing tick publish");
            }
        }
    }

    /// Runs one participant through one tick: for each candidate symbol,
    /// price → signal → trade → log, strictly in order, then a revaluation at
    /// fresh prices. Failures skip the symbol, never the participant's
    /// remaining symbols.
    async fn execute_participant(
        &self,
        round: &Round,
        wallet: &str,
    ) -> Result<(), EngineError> {
        let mut participant = self.get_participant(&round.id, wallet).await?;
        if !participant.active {
            return Ok(());
        }
        let parsed = participant.binding.parsed().clone();

        let candidates: Vec<String> = parsed
            .candidate_symbols()
            .iter()
            .take(MAX_SYMBOLS_PER_TICK)
            .map(|s| s.trim().to_uppercase())
            .filter(|s| self.feed().is_allowed(s) && round.allows_token(s))
            .collect();

        let policy = TradePolicy::from(&round.settings);
        for symbol in candidates {
            let snapshot = match self.feed().get_price(&symbol).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    tracing::warn!(symbol = %symbol, error = %err, "price unavailable, skipping symbol");
                    continue;
                }
            };
            let signal = match self.llm().generate_signal(&snapshot, &parsed).await {
                Ok(signal) => signal,
                Err(err) => {
                    tracing::warn!(symbol = %symbol, error = %err, "signal unavailable, skipping symbol");
                    continue;
                }
            };

            let executed = match signal.action {
                SignalAction::Buy => {
                    if participant.portfolio.position(&symbol).is_some() {
                        // Already long; one position per symbol per round.
                        false
                    } else {
                        executor::apply_buy(
                            &mut participant.portfolio,
                            &symbol,
                            snapshot.price,
                            signal.confidence,
                            &policy,
                        )
                    }
                }
                SignalAction::Sell => {
                    executor::apply_sell(&mut participant.portfolio, &symbol, snapshot.price)
                }
                SignalAction::Hold => false,
            };

            self.append_trade_log(round, &participant, &symbol, &signal, snapshot.price, executed)
                .await;
        }

        self.revalue_participant(&mut participant).await;
        participant.last_update = Utc::now();
        self.persist_participant(round, &participant).await?;
        Ok(())
    }

    async fn append_trade_log(
        &self,
        round: &Round,
        participant: &Participant,
        symbol: &str,
        signal: &core_types::Signal,
        price: f64,
        executed: bool,
    ) {
        let entry = TradeLogEntry {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            action: signal.action,
            price,
            confidence: signal.confidence,
            reason: signal.reason.clone(),
            executed,
        };
        let field = format!("{}:{}", entry.timestamp.timestamp_millis(), symbol);
        let serialized = match serde_json::to_string(&entry) {
            Ok(serialized) => serialized,
            Err(err) => {
                tracing::warn!(error = %err, "unserializable trade log entry");
                return;
            }
        };
        let key = keys::logs(&round.id, &participant.wallet);
        if let Err(err) = self.store().hset(&key, &field, &serialized).await {
            tracing::warn!(wallet = %participant.wallet, error = %err, "trade log write failed");
        }
    }
}
