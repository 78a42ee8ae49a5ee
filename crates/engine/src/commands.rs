//! The command surface: every externally reachable operation as a typed
//! request/response pair wrapped in a `{success, …}` envelope. The HTTP/RPC
//! transport dispatches onto this service; it carries no transport concerns
//! itself.

use crate::prompt::{round_config_from_prompt, PromptOverrides};
use crate::{
    EngineError, JoinCheck, JoinRequest, RoundConfig, RoundListStatus, RoundManager,
};
use core_types::{
    EnhancedLeaderboardEntry, LeaderboardEntry, MarketSnapshot, ParsedStrategy, Participant,
    Round, RoundPromptData, Signal, Strategy, TradeLogEntry,
};
use serde::Serialize;

/// The `{success, data | error+message}` envelope every command returns.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> CommandResult<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    fn err(err: EngineError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.kind().to_string()),
            message: Some(err.to_string()),
        }
    }
}

impl<T> From<Result<T, EngineError>> for CommandResult<T> {
    fn from(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(data) => CommandResult::ok(data),
            Err(err) => CommandResult::err(err),
        }
    }
}

/// A round together with its current participant wallets, as `get-round`
/// returns it.
#[derive(Debug, Clone, Serialize)]
pub struct RoundView {
    #[serde(flatten)]
    pub round: Round,
    pub current_participants: Vec<String>,
}

/// A prompted round together with what the LLM extracted from the request.
#[derive(Debug, Clone, Serialize)]
pub struct PromptRound {
    pub round: Round,
    pub extracted: RoundPromptData,
}

/// The command dispatcher over the assembled core.
#[derive(Clone)]
pub struct CommandService {
    manager: RoundManager,
}

impl CommandService {
    pub fn new(manager: RoundManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &RoundManager {
        &self.manager
    }

    // --- Round lifecycle ---

    pub async fn create_round(&self, config: RoundConfig) -> CommandResult<Round> {
        self.manager.create_round(config).await.into()
    }

    /// `create-game-from-prompt`: LLM-extract a configuration from prose,
    /// merge overrides and defaults, create the round.
    pub async fn create_round_from_prompt(
        &self,
        query: &str,
        overrides: PromptOverrides,
    ) -> CommandResult<PromptRound> {
        let extracted = match self.manager.llm().parse_round_prompt(query).await {
            Ok(extracted) => extracted,
            Err(err) => return CommandResult::err(err.into()),
        };
        let config = round_config_from_prompt(&extracted, &overrides);
        match self.manager.create_round(config).await {
            Ok(round) => CommandResult::ok(PromptRound { round, extracted }),
            Err(err) => CommandResult::err(err),
        }
    }

    pub async fn join_round(
        &self,
        round_id: &str,
        request: JoinRequest,
    ) -> CommandResult<Participant> {
        self.manager.join_round(round_id, request).await.into()
    }

    pub async fn start_round(&self, round_id: &str) -> CommandResult<Round> {
        self.manager.start_round(round_id).await.into()
    }

    pub async fn end_round(&self, round_id: &str) -> CommandResult<Round> {
        self.manager.end_round(round_id).await.into()
    }

    pub async fn get_round(&self, round_id: &str) -> CommandResult<RoundView> {
        let round = match self.manager.get_round(round_id).await {
            Ok(round) => round,
            Err(err) => return CommandResult::err(err),
        };
        let current_participants = match self.manager.load_participants(round_id).await {
            Ok(participants) => participants.into_iter().map(|p| p.wallet).collect(),
            Err(err) => return CommandResult::err(err),
        };
        CommandResult::ok(RoundView {
            round,
            current_participants,
        })
    }

    pub async fn list_rounds(&self, status: &str, limit: usize) -> CommandResult<Vec<Round>> {
        match RoundListStatus::parse(status) {
            Ok(status) => self.manager.list_rounds(status, limit).await.into(),
            Err(err) => CommandResult::err(err),
        }
    }

    pub async fn can_join(&self, round_id: &str, wallet: &str) -> CommandResult<JoinCheck> {
        self.manager.can_join(round_id, wallet).await.into()
    }

    // --- Leaderboards and participants ---

    pub async fn get_leaderboard(
        &self,
        round_id: &str,
        limit: usize,
    ) -> CommandResult<Vec<LeaderboardEntry>> {
        self.manager.leaderboard(round_id, limit).await.into()
    }

    pub async fn get_enhanced_leaderboard(
        &self,
        round_id: &str,
        limit: usize,
    ) -> CommandResult<Vec<EnhancedLeaderboardEntry>> {
        self.manager
            .enhanced_leaderboard(round_id, limit)
            .await
            .into()
    }

    pub async fn get_participant(
        &self,
        round_id: &str,
        wallet: &str,
    ) -> CommandResult<Participant> {
        self.manager.get_participant(round_id, wallet).await.into()
    }

    pub async fn get_participants(&self, round_id: &str) -> CommandResult<Vec<Participant>> {
        self.manager.load_participants(round_id).await.into()
    }

    pub async fn get_participant_logs(
        &self,
        round_id: &str,
        wallet: &str,
        limit: usize,
    ) -> CommandResult<Vec<TradeLogEntry>> {
        self.manager
            .participant_logs(round_id, wallet, limit)
            .await
            .into()
    }

    // --- Strategy registry ---

    pub async fn register_strategy(
        &self,
        owner: &str,
        text: &str,
        royalty_percent: f64,
        name: &str,
        description: &str,
        tags: Vec<String>,
    ) -> CommandResult<Strategy> {
        self.manager
            .registry()
            .register(owner, text, royalty_percent, name, description, tags)
            .await
            .map_err(EngineError::from)
            .into()
    }

    pub async fn get_strategy(&self, id: u64) -> CommandResult<Strategy> {
        self.manager
            .registry()
            .get(id)
            .await
            .map_err(EngineError::from)
            .into()
    }

    pub async fn get_user_strategies(&self, owner: &str) -> CommandResult<Vec<Strategy>> {
        self.manager
            .registry()
            .list_by_owner(owner)
            .await
            .map_err(EngineError::from)
            .into()
    }

    /// The marketplace: top verified strategies.
    pub async fn get_marketplace(&self, limit: usize) -> CommandResult<Vec<Strategy>> {
        self.manager
            .registry()
            .list_top(limit)
            .await
            .map_err(EngineError::from)
            .into()
    }

    pub async fn search_strategies(
        &self,
        query: &str,
        limit: usize,
    ) -> CommandResult<Vec<Strategy>> {
        self.manager
            .registry()
            .search(query, limit)
            .await
            .map_err(EngineError::from)
            .into()
    }

    // --- LLM utilities ---

    pub async fn parse_strategy(&self, text: &str) -> CommandResult<ParsedStrategy> {
        self.manager
            .llm()
            .parse_strategy(text)
            .await
            .map_err(EngineError::from)
            .into()
    }

    /// One-shot signal for a symbol under a free-text strategy.
    pub async fn signal(&self, symbol: &str, strategy: &str) -> CommandResult<Signal> {
        let result = async {
            let parsed = self.manager.llm().parse_strategy(strategy).await?;
            let snapshot = self.manager.feed().get_price(symbol).await?;
            Ok::<Signal, EngineError>(
                self.manager.llm().generate_signal(&snapshot, &parsed).await?,
            )
        }
        .await;
        result.into()
    }

    /// A short market readout for a symbol over a timeframe.
    pub async fn insight(&self, symbol: &str, timeframe: &str) -> CommandResult<String> {
        let result = async {
            let snapshot = self.manager.feed().get_price(symbol).await?;
            let parsed = ParsedStrategy {
                timeframe: timeframe.to_string(),
                ..ParsedStrategy::default()
            };
            let signal = self.manager.llm().generate_signal(&snapshot, &parsed).await?;
            Ok::<String, EngineError>(format!(
                "{} is at ${:.6} ({:+.2}% 24h, ${:.0} volume). {:?} bias over {}: {}",
                snapshot.symbol,
                snapshot.price,
                snapshot.change_24h,
                snapshot.volume_24h,
                signal.action,
                timeframe,
                signal.reason,
            ))
        }
        .await;
        result.into()
    }

    // --- Market data ---

    pub async fn base_price(&self, symbol: &str) -> CommandResult<MarketSnapshot> {
        self.manager
            .feed()
            .get_price(symbol)
            .await
            .map_err(EngineError::from)
            .into()
    }

    pub async fn base_trending(&self, limit: usize) -> CommandResult<Vec<MarketSnapshot>> {
        self.manager
            .feed()
            .get_trending(limit)
            .await
            .map_err(EngineError::from)
            .into()
    }

    /// `base-top` is the trending listing with the stock limit.
    pub async fn base_top(&self) -> CommandResult<Vec<MarketSnapshot>> {
        self.base_trending(10).await
    }

    pub fn base_tokens(&self) -> CommandResult<Vec<String>> {
        CommandResult::ok(self.manager.feed().list_allowed())
    }

    /// `base-strategies`: the marketplace listing under its market-surface name.
    pub async fn base_strategies(&self, limit: usize) -> CommandResult<Vec<Strategy>> {
        self.get_marketplace(limit).await
    }

    /// `base-signal`: a signal for a symbol under the stock strategy.
    pub async fn base_signal(&self, symbol: &str) -> CommandResult<Signal> {
        let result = async {
            let snapshot = self.manager.feed().get_price(symbol).await?;
            let parsed = ParsedStrategy::default();
            Ok::<Signal, EngineError>(
                self.manager.llm().generate_signal(&snapshot, &parsed).await?,
            )
        }
        .await;
        result.into()
    }
}
