use chrono::Utc;
use core_types::{
    Participant, Portfolio, Round, RoundSettings, RoundStats, RoundStatus, StrategyBinding,
    TradeLogEntry,
};
use events::{EventBus, GameEvent};
use llm_client::Llm;
use market_data::MarketData;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use store::KvStore;
use strategy_registry::StrategyRegistry;
use tokio::sync::Mutex;
use uuid::Uuid;

pub mod commands;
pub mod error;
pub mod keys;
pub mod leaderboard;
pub mod prompt;
pub mod scheduler;

// Re-export the core types to provide a clean public API.
pub use commands::{CommandResult, CommandService};
pub use error::EngineError;
pub use prompt::PromptOverrides;

/// Grace delay between a round filling up and its automatic start.
const AUTOSTART_DELAY: Duration = Duration::from_secs(5);

/// The inputs for creating a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    pub title: String,
    pub description: String,
    pub duration_secs: u64,
    pub starting_balance: f64,
    pub min_participants: u32,
    pub max_participants: u32,
    pub execution_interval_secs: u64,
    pub allowed_tokens: Vec<String>,
    pub auto_start: bool,
    pub expected_profit_percent: f64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            title: "Trading Round".to_string(),
            description: String::new(),
            duration_secs: 300,
            starting_balance: 10_000.0,
            min_participants: 2,
            max_participants: 10,
            execution_interval_secs: 15,
            allowed_tokens: Vec::new(),
            auto_start: true,
            expected_profit_percent: 5.0,
        }
    }
}

/// The inputs for joining a round. Exactly one of `strategy`, `strategy_id`
/// or `license_strategy_id` must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinRequest {
    pub wallet: String,
    pub username: Option<String>,
    /// Free-text strategy, parsed at join time.
    pub strategy: Option<String>,
    /// A registered strategy the joiner owns.
    pub strategy_id: Option<u64>,
    /// Another wallet's registered strategy, to be licensed for this round.
    pub license_strategy_id: Option<u64>,
    /// When joining with free text, also register the strategy at this
    /// royalty so other wallets can license it.
    pub royalty_percent: Option<f64>,
}

/// The answer to a `can-join` probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinCheck {
    pub can_join: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl JoinCheck {
    fn no(reason: &str) -> Self {
        Self {
            can_join: false,
            reason: Some(reason.to_string()),
        }
    }
}

/// Which listing set a `list-rounds` call reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundListStatus {
    /// Open for joins.
    Active,
    /// In play.
    Running,
    Finished,
}

impl RoundListStatus {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw.trim().to_lowercase().as_str() {
            "active" | "waiting" => Ok(RoundListStatus::Active),
            "running" => Ok(RoundListStatus::Running),
            "finished" => Ok(RoundListStatus::Finished),
            other => Err(EngineError::Validation(format!(
                "Unknown round status: {}",
                other
            ))),
        }
    }

    fn set_key(self) -> &'static str {
        match self {
            RoundListStatus::Active => keys::ROUNDS_ACTIVE,
            RoundListStatus::Running => keys::ROUNDS_RUNNING,
            RoundListStatus::Finished => keys::ROUNDS_FINISHED,
        }
    }
}

/// The central orchestrator: round lifecycle, participant admission, the
/// per-round execution scheduler and leaderboard maintenance.
///
/// All round state lives in the store; the manager keeps only a per-round
/// mutex that serializes joins, lifecycle transitions and post-tick writes.
/// Cloning is cheap and every clone shares the same runtime state.
#[derive(Clone)]
pub struct RoundManager {
    store: Arc<dyn KvStore>,
    feed: Arc<dyn MarketData>,
    llm: Arc<dyn Llm>,
    registry: Arc<StrategyRegistry>,
    bus: EventBus,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl RoundManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        feed: Arc<dyn MarketData>,
        llm: Arc<dyn Llm>,
        registry: Arc<StrategyRegistry>,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            feed,
            llm,
            registry,
            bus,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub(crate) fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub(crate) fn feed(&self) -> &Arc<dyn MarketData> {
        &self.feed
    }

    pub(crate) fn llm(&self) -> &Arc<dyn Llm> {
        &self.llm
    }

    pub(crate) fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    /// The mutex guarding one round's record, participant set and leaderboard.
    pub(crate) async fn round_lock(&self, round_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(round_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Creates a round in `waiting` and announces it.
    pub async fn create_round(&self, config: RoundConfig) -> Result<Round, EngineError> {
        if config.duration_secs == 0 {
            return Err(EngineError::Validation(
                "Round duration must be positive".to_string(),
            ));
        }
        if config.starting_balance <= 0.0 {
            return Err(EngineError::Validation(
                "Starting balance must be positive".to_string(),
            ));
        }
        if config.min_participants == 0 || config.max_participants < config.min_participants {
            return Err(EngineError::Validation(
                "Participant bounds must satisfy 1 <= min <= max".to_string(),
            ));
        }
        if config.execution_interval_secs == 0 {
            return Err(EngineError::Validation(
                "Execution interval must be positive".to_string(),
            ));
        }

        let number = self.store.incr(keys::ROUND_COUNTER).await? as u64;
        let defaults = RoundSettings::default();
        let round = Round {
            id: Uuid::new_v4().to_string(),
            number,
            title: config.title,
            description: config.description,
            duration_ms: (config.duration_secs * 1_000) as i64,
            starting_balance: config.starting_balance,
            min_participants: config.min_participants,
            max_participants: config.max_participants,
            settings: RoundSettings {
                execution_interval_ms: config.execution_interval_secs * 1_000,
                allowed_tokens: config
                    .allowed_tokens
                    .iter()
                    .map(|t| t.trim().to_uppercase())
                    .filter(|t| !t.is_empty())
                    .collect(),
                auto_start: config.auto_start,
                expected_profit_percent: config.expected_profit_percent,
                ..defaults
            },
            status: RoundStatus::Waiting,
            created_at: Utc::now(),
            start_at: None,
            end_at: None,
            stats: RoundStats::default(),
            autostart_armed: false,
        };

        self.persist_round(&round).await?;
        self.store
            .set(&keys::round_number(round.number), &round.id)
            .await?;
        self.store.sadd(keys::ROUNDS_ACTIVE, &round.id).await?;

        tracing::info!(round_id = %round.id, number = round.number, "round created");
        self.bus.publish(GameEvent::RoundCreated {
            round_id: round.id.clone(),
            number: round.number,
            title: round.title.clone(),
            max_participants: round.max_participants,
        });
        Ok(round)
    }

    pub async fn get_round(&self, round_id: &str) -> Result<Round, EngineError> {
        let raw = self
            .store
            .get(&keys::round(round_id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Round not found: {}", round_id)))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Admits a wallet into a waiting round, resolving its strategy binding
    /// and creating its portfolio.
    pub async fn join_round(
        &self,
        round_id: &str,
        request: JoinRequest,
    ) -> Result<Participant, EngineError> {
        let lock = self.round_lock(round_id).await;
        let _guard = lock.lock().await;

        let mut round = self.get_round(round_id).await?;
        if round.status != RoundStatus::Waiting {
            return Err(EngineError::Conflict(
                "Round is not accepting participants".to_string(),
            ));
        }
        if round.is_full() {
            return Err(EngineError::Conflict("Round is full".to_string()));
        }

        let wallet = request.wallet.trim().to_string();
        if wallet.is_empty() {
            return Err(EngineError::Validation(
                "Wallet address is required".to_string(),
            ));
        }
        if self
            .store
            .sismember(&keys::participants(round_id), &wallet)
            .await?
        {
            return Err(EngineError::Conflict(
                "Already joined this round".to_string(),
            ));
        }

        let binding = self.resolve_binding(round_id, &wallet, &request).await?;

        let now = Utc::now();
        let username = request
            .username
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| short_wallet(&wallet));
        let participant = Participant {
            round_id: round_id.to_string(),
            wallet: wallet.clone(),
            username,
            binding,
            portfolio: Portfolio::new(round.starting_balance),
            joined_at: now,
            last_update: now,
            active: true,
        };

        self.persist_participant(&round, &participant).await?;
        self.store
            .sadd(&keys::participants(round_id), &wallet)
            .await?;
        self.store
            .expire(&keys::participants(round_id), round_ttl(&round))
            .await?;

        round.stats.total_participants += 1;
        let arm_autostart =
            round.settings.auto_start && round.is_full() && !round.autostart_armed;
        if arm_autostart {
            round.autostart_armed = true;
        }
        self.persist_round(&round).await?;

        tracing::info!(
            round_id = %round_id,
            wallet = %wallet,
            participants = round.stats.total_participants,
            "participant joined"
        );
        self.bus.publish(GameEvent::ParticipantJoined {
            round_id: round_id.to_string(),
            wallet: wallet.clone(),
            username: participant.username.clone(),
            total_participants: round.stats.total_participants,
        });

        if arm_autostart {
            let manager = self.clone();
            let round_id = round_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(AUTOSTART_DELAY).await;
                if let Err(err) = manager.start_round(&round_id).await {
                    tracing::warn!(round_id = %round_id, error = %err, "autostart failed");
                }
            });
        }

        Ok(participant)
    }

    /// Resolves exactly one of the three strategy sources into a binding.
    async fn resolve_binding(
        &self,
        round_id: &str,
        wallet: &str,
        request: &JoinRequest,
    ) -> Result<StrategyBinding, EngineError> {
        let strategy_text = request
            .strategy
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let provided = [
            strategy_text.is_some(),
            request.strategy_id.is_some(),
            request.license_strategy_id.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();
        if provided != 1 {
            return Err(EngineError::Validation(
                "Provide exactly one of strategy text, strategyId or licenseStrategyId".to_string(),
            ));
        }

        if let Some(text) = strategy_text {
            // An inline strategy with a royalty is registered on the spot so
            // other wallets can license it in later rounds.
            if let Some(royalty) = request.royalty_percent {
                let strategy = self
                    .registry
                    .register(wallet, text, royalty, "Inline strategy", text, Vec::new())
                    .await?;
                return Ok(StrategyBinding::Owned {
                    strategy_id: strategy.id,
                    parsed: strategy.parsed,
                });
            }
            let parsed = self.llm.parse_strategy(text).await?;
            return Ok(StrategyBinding::Inline { parsed });
        }

        if let Some(strategy_id) = request.strategy_id {
            let strategy = self.registry.get(strategy_id).await?;
            if strategy.owner != wallet {
                return Err(EngineError::Validation(
                    "Strategy not owned by this wallet".to_string(),
                ));
            }
            return Ok(StrategyBinding::Owned {
                strategy_id,
                parsed: strategy.parsed,
            });
        }

        let strategy_id = request
            .license_strategy_id
            .expect("one source is present by the count check");
        let license = self.registry.license(wallet, strategy_id, round_id).await?;
        let parsed = self.registry.parse_for(strategy_id).await?;
        Ok(StrategyBinding::Licensed {
            strategy_id,
            owner: license.strategy_owner,
            royalty_percent: license.royalty_percent,
            parsed,
        })
    }

    /// Probes whether a wallet could join right now.
    pub async fn can_join(&self, round_id: &str, wallet: &str) -> Result<JoinCheck, EngineError> {
        let round = match self.get_round(round_id).await {
            Ok(round) => round,
            Err(EngineError::NotFound(_)) => return Ok(JoinCheck::no("Round not found")),
            Err(err) => return Err(err),
        };
        if round.status != RoundStatus::Waiting {
            return Ok(JoinCheck::no("Round is not accepting participants"));
        }
        if round.is_full() {
            return Ok(JoinCheck::no("Round is full"));
        }
        if self
            .store
            .sismember(&keys::participants(round_id), wallet)
            .await?
        {
            return Ok(JoinCheck::no("Already joined this round"));
        }
        Ok(JoinCheck {
            can_join: true,
            reason: None,
        })
    }

    /// Transitions a waiting round to active and launches its scheduler.
    pub async fn start_round(&self, round_id: &str) -> Result<Round, EngineError> {
        let lock = self.round_lock(round_id).await;
        let _guard = lock.lock().await;

        let mut round = self.get_round(round_id).await?;
        match round.status {
            RoundStatus::Waiting => {}
            RoundStatus::Active => {
                return Err(EngineError::Conflict("Round already started".to_string()));
            }
            RoundStatus::Finished | RoundStatus::Cancelled => {
                return Err(EngineError::Conflict(
                    "Round is already over".to_string(),
                ));
            }
        }
        if round.stats.total_participants < round.min_participants {
            return Err(EngineError::Validation(format!(
                "Need at least {} participants to start",
                round.min_participants
            )));
        }

        let now = Utc::now();
        round.status = RoundStatus::Active;
        round.start_at = Some(now);
        round.end_at = Some(now + chrono::Duration::milliseconds(round.duration_ms));
        self.persist_round(&round).await?;

        self.store.srem(keys::ROUNDS_ACTIVE, round_id).await?;
        self.store.sadd(keys::ROUNDS_RUNNING, round_id).await?;

        tracing::info!(round_id = %round_id, end_at = ?round.end_at, "round started");
        self.bus.publish(GameEvent::RoundStarted {
            round_id: round_id.to_string(),
            start_at: now,
            end_at: round.end_at.expect("set above"),
        });

        self.spawn_scheduler(round_id.to_string());
        Ok(round)
    }

    /// Ends an active round: final revaluation, final leaderboard, strategy
    /// stats settlement, terminal bookkeeping.
    pub async fn end_round(&self, round_id: &str) -> Result<Round, EngineError> {
        let lock = self.round_lock(round_id).await;
        let _guard = lock.lock().await;

        let mut round = self.get_round(round_id).await?;
        match round.status {
            RoundStatus::Active => {}
            RoundStatus::Waiting => {
                return Err(EngineError::Conflict("Round has not started".to_string()));
            }
            RoundStatus::Finished | RoundStatus::Cancelled => {
                return Err(EngineError::Conflict(
                    "Round is already over".to_string(),
                ));
            }
        }

        round.status = RoundStatus::Finished;
        round.end_at = Some(Utc::now());

        // Final mark-to-market for everyone, tolerating per-participant
        // failures the same way a tick does.
        let mut participants = self.load_participants(round_id).await?;
        for participant in participants.iter_mut() {
            self.revalue_participant(participant).await;
            participant.last_update = Utc::now();
            if let Err(err) = self.persist_participant(&round, participant).await {
                tracing::warn!(
                    round_id = %round_id,
                    wallet = %participant.wallet,
                    error = %err,
                    "failed to persist participant at round end"
                );
            }
        }

        let entries = self.rebuild_leaderboard(&round).await?;

        round.stats.total_trades = participants
            .iter()
            .map(|p| u64::from(p.portfolio.trades))
            .sum();

        self.store.srem(keys::ROUNDS_RUNNING, round_id).await?;
        self.store.sadd(keys::ROUNDS_FINISHED, round_id).await?;

        self.settle_strategy_outcomes(round_id, &participants).await;

        self.persist_round(&round).await?;

        tracing::info!(round_id = %round_id, participants = participants.len(), "round ended");
        self.bus.publish(GameEvent::RoundEnded {
            round_id: round_id.to_string(),
            leaderboard: entries,
        });
        Ok(round)
    }

    /// Cancels a round that has not started. Terminal.
    pub async fn cancel_round(&self, round_id: &str) -> Result<Round, EngineError> {
        let lock = self.round_lock(round_id).await;
        let _guard = lock.lock().await;

        let mut round = self.get_round(round_id).await?;
        if round.status != RoundStatus::Waiting {
            return Err(EngineError::Conflict(
                "Only waiting rounds can be cancelled".to_string(),
            ));
        }
        round.status = RoundStatus::Cancelled;
        self.persist_round(&round).await?;
        self.store.srem(keys::ROUNDS_ACTIVE, round_id).await?;
        tracing::info!(round_id = %round_id, "round cancelled");
        Ok(round)
    }

    /// Rounds in one listing set, newest first.
    pub async fn list_rounds(
        &self,
        status: RoundListStatus,
        limit: usize,
    ) -> Result<Vec<Round>, EngineError> {
        let ids = self.store.smembers(status.set_key()).await?;
        let mut rounds = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_round(&id).await {
                Ok(round) => rounds.push(round),
                Err(EngineError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        rounds.sort_by(|a, b| b.number.cmp(&a.number));
        rounds.truncate(limit);
        Ok(rounds)
    }

    pub async fn get_participant(
        &self,
        round_id: &str,
        wallet: &str,
    ) -> Result<Participant, EngineError> {
        let raw = self
            .store
            .get(&keys::participant(round_id, wallet))
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Participant not found: {}", wallet))
            })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Every participant of a round; records that fail to load are skipped
    /// with a warning rather than failing the listing.
    pub async fn load_participants(
        &self,
        round_id: &str,
    ) -> Result<Vec<Participant>, EngineError> {
        let wallets = self.store.smembers(&keys::participants(round_id)).await?;
        let mut participants = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            match self.get_participant(round_id, &wallet).await {
                Ok(participant) => participants.push(participant),
                Err(err) => {
                    tracing::warn!(
                        round_id = %round_id,
                        wallet = %wallet,
                        error = %err,
                        "skipping unloadable participant"
                    );
                }
            }
        }
        participants.sort_by(|a, b| a.wallet.cmp(&b.wallet));
        Ok(participants)
    }

    /// A participant's trade log, newest first.
    pub async fn participant_logs(
        &self,
        round_id: &str,
        wallet: &str,
        limit: usize,
    ) -> Result<Vec<TradeLogEntry>, EngineError> {
        let raw = self.store.hgetall(&keys::logs(round_id, wallet)).await?;
        let mut entries: Vec<TradeLogEntry> = raw
            .values()
            .filter_map(|v| serde_json::from_str(v).ok())
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }

    pub(crate) async fn persist_round(&self, round: &Round) -> Result<(), EngineError> {
        self.store
            .set_ex(
                &keys::round(&round.id),
                &serde_json::to_string(round)?,
                round_ttl(round),
            )
            .await?;
        Ok(())
    }

    pub(crate) async fn persist_participant(
        &self,
        round: &Round,
        participant: &Participant,
    ) -> Result<(), EngineError> {
        self.store
            .set_ex(
                &keys::participant(&round.id, &participant.wallet),
                &serde_json::to_string(participant)?,
                round_ttl(round),
            )
            .await?;
        Ok(())
    }

    /// Re-marks a participant's positions at current prices. Feed failures
    /// leave the previous mark in place.
    pub(crate) async fn revalue_participant(&self, participant: &mut Participant) {
        let symbols: Vec<String> = participant.portfolio.positions.keys().cloned().collect();
        let mut snapshots = HashMap::new();
        for symbol in symbols {
            match self.feed.get_price(&symbol).await {
                Ok(snapshot) => {
                    snapshots.insert(symbol, snapshot);
                }
                Err(err) => {
                    tracing::warn!(symbol = %symbol, error = %err, "price unavailable during revaluation");
                }
            }
        }
        executor::revalue(&mut participant.portfolio, &snapshots);
    }

    /// Feeds each bound registered strategy its round outcome and accrues
    /// royalties on licensed bindings. Failures are logged, never fatal.
    async fn settle_strategy_outcomes(&self, round_id: &str, participants: &[Participant]) {
        for participant in participants {
            let Some(strategy_id) = participant.binding.strategy_id() else {
                continue;
            };
            let pf = &participant.portfolio;
            let profit = pf.total_value - pf.starting_balance;

            let earnings = match &participant.binding {
                StrategyBinding::Licensed {
                    royalty_percent, ..
                } if profit > 0.0 => profit * royalty_percent / 100.0,
                _ => 0.0,
            };

            let outcome = core_types::StrategyOutcome {
                trades: u64::from(pf.trades),
                win: profit > 0.0,
                earnings,
                return_pct: pf.pnl_percent,
            };
            if let Err(err) = self.registry.update_stats(strategy_id, outcome).await {
                tracing::warn!(strategy_id, error = %err, "failed to settle strategy stats");
            }
            if participant.binding.is_licensed() && earnings > 0.0 {
                if let Err(err) = self
                    .registry
                    .accrue_royalty(&participant.wallet, round_id, earnings)
                    .await
                {
                    tracing::warn!(strategy_id, error = %err, "failed to accrue royalty");
                }
            }
        }
    }
}

pub(crate) fn round_ttl(round: &Round) -> Duration {
    round
        .ttl()
        .to_std()
        .unwrap_or_else(|_| Duration::from_secs(3_600))
}

fn short_wallet(wallet: &str) -> String {
    if wallet.len() > 10 {
        format!("{}…{}", &wallet[..6], &wallet[wallet.len() - 4..])
    } else {
        wallet.to_string()
    }
}
