//! End-to-end round flows over the in-memory store with scripted market data
//! and scripted signals.

use async_trait::async_trait;
use chrono::Utc;
use core_types::{
    MarketSnapshot, ParsedStrategy, PriceSource, RoundPromptData, RoundStatus, Signal,
    SignalAction,
};
use engine::{CommandService, JoinRequest, PromptOverrides, RoundConfig, RoundListStatus, RoundManager};
use events::{EventBus, GameEvent};
use llm_client::{ChatApi, Llm, LlmClient, LlmError};
use market_data::{FeedError, MarketData};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use store::{FailoverStore, KvStore, MemoryStore};
use strategy_registry::StrategyRegistry;

/// A feed with fixed prices per symbol.
struct ScriptedFeed {
    prices: HashMap<String, f64>,
}

impl ScriptedFeed {
    fn new(prices: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            prices: prices
                .iter()
                .map(|(s, p)| (s.to_string(), *p))
                .collect(),
        })
    }

    fn snapshot(&self, symbol: &str, price: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: symbol.to_string(),
            price,
            change_24h: 1.0,
            volume_24h: 1_000_000.0,
            liquidity: 500_000.0,
            market_cap: 0.0,
            source: PriceSource::Dex,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl MarketData for ScriptedFeed {
    async fn get_price(&self, symbol: &str) -> Result<MarketSnapshot, FeedError> {
        let symbol = symbol.to_uppercase();
        match self.prices.get(&symbol) {
            Some(price) => Ok(self.snapshot(&symbol, *price)),
            None => Err(FeedError::SymbolNotSupported(symbol)),
        }
    }

    async fn get_trending(&self, _limit: usize) -> Result<Vec<MarketSnapshot>, FeedError> {
        Ok(Vec::new())
    }

    fn is_allowed(&self, symbol: &str) -> bool {
        self.prices.contains_key(&symbol.to_uppercase())
    }

    fn list_allowed(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.prices.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

/// An LLM that parses every strategy to a fixed asset list and answers each
/// symbol with a scripted action.
struct ScriptedLlm {
    assets: Vec<String>,
    signals: HashMap<String, (SignalAction, u8)>,
    prompt_data: RoundPromptData,
}

impl ScriptedLlm {
    fn new(assets: &[&str], signals: &[(&str, SignalAction, u8)]) -> Arc<Self> {
        Arc::new(Self {
            assets: assets.iter().map(|s| s.to_string()).collect(),
            signals: signals
                .iter()
                .map(|(s, a, c)| (s.to_string(), (*a, *c)))
                .collect(),
            prompt_data: RoundPromptData::default(),
        })
    }
}

#[async_trait]
impl Llm for ScriptedLlm {
    async fn parse_strategy(&self, _text: &str) -> Result<ParsedStrategy, LlmError> {
        Ok(ParsedStrategy {
            assets: self.assets.clone(),
            suggested_base_tokens: self.assets.clone(),
            ..ParsedStrategy::default()
        })
    }

    async fn generate_signal(
        &self,
        snapshot: &MarketSnapshot,
        _parsed: &ParsedStrategy,
    ) -> Result<Signal, LlmError> {
        let (action, confidence) = self
            .signals
            .get(&snapshot.symbol)
            .copied()
            .unwrap_or((SignalAction::Hold, 5));
        Ok(Signal {
            action,
            confidence,
            reason: "scripted".to_string(),
            entry_price: snapshot.price,
            stop_loss: snapshot.price * 0.95,
            take_profit: snapshot.price * 1.10,
            risk_reward_ratio: 2.0,
        })
    }

    async fn parse_round_prompt(&self, _query: &str) -> Result<RoundPromptData, LlmError> {
        Ok(self.prompt_data.clone())
    }
}

struct Harness {
    manager: RoundManager,
    registry: Arc<StrategyRegistry>,
}

fn harness(feed: Arc<dyn MarketData>, llm: Arc<dyn Llm>) -> Harness {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let registry = Arc::new(StrategyRegistry::new(store.clone(), llm.clone()));
    let manager = RoundManager::new(store, feed, llm, registry.clone(), EventBus::new(256));
    Harness { manager, registry }
}

fn eth_toshi_harness() -> Harness {
    let feed = ScriptedFeed::new(&[("ETH", 3_000.0), ("TOSHI", 0.0001)]);
    let llm = ScriptedLlm::new(
        &["ETH", "TOSHI"],
        &[
            ("ETH", SignalAction::Buy, 7),
            ("TOSHI", SignalAction::Hold, 5),
        ],
    );
    harness(feed, llm)
}

fn join(wallet: &str) -> JoinRequest {
    JoinRequest {
        wallet: wallet.to_string(),
        strategy: Some("Buy ETH when trending".to_string()),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_round_buys_once_and_ranks() {
    let h = eth_toshi_harness();
    let round = h
        .manager
        .create_round(RoundConfig {
            duration_secs: 60,
            starting_balance: 10_000.0,
            min_participants: 2,
            max_participants: 2,
            execution_interval_secs: 1,
            allowed_tokens: vec!["ETH".to_string(), "TOSHI".to_string()],
            auto_start: false,
            ..Default::default()
        })
        .await
        .unwrap();

    h.manager.join_round(&round.id, join("0xaaa")).await.unwrap();
    h.manager.join_round(&round.id, join("0xbbb")).await.unwrap();
    h.manager.start_round(&round.id).await.unwrap();

    // Let three ticks run.
    tokio::time::sleep(Duration::from_millis(3_400)).await;
    h.manager.end_round(&round.id).await.unwrap();

    for wallet in ["0xaaa", "0xbbb"] {
        let participant = h.manager.get_participant(&round.id, wallet).await.unwrap();
        let pf = &participant.portfolio;

        // One buy on the first tick, never pyramided on later ticks:
        // 10_000 × 0.3 × 0.7 = 2_100 plus a 2.1 fee.
        assert_eq!(pf.trades, 1, "{} should have exactly one trade", wallet);
        let eth = pf.position("ETH").expect("long ETH position");
        assert!((eth.amount - 0.7).abs() < 1e-9);
        assert!((pf.cash - 7_897.9).abs() < 1e-6);
        assert!(pf.position("TOSHI").is_none());
        assert!((pf.total_value - (pf.cash + 0.7 * 3_000.0)).abs() < 1e-6);

        // The HOLD on TOSHI and the skipped re-buys are all logged.
        let logs = h
            .manager
            .participant_logs(&round.id, wallet, 100)
            .await
            .unwrap();
        assert!(logs.iter().any(|l| l.symbol == "ETH" && l.executed));
        assert!(logs.iter().any(|l| l.symbol == "TOSHI" && !l.executed));
    }

    let leaderboard = h.manager.leaderboard(&round.id, 10).await.unwrap();
    assert_eq!(leaderboard.len(), 2);
    assert_eq!(leaderboard[0].rank, 1);
    assert_eq!(leaderboard[1].rank, 2);
    // Identical portfolios tie; order falls back to wallet order.
    assert_eq!(leaderboard[0].wallet, "0xaaa");
}

#[tokio::test(flavor = "multi_thread")]
async fn capacity_overshoot_admits_exactly_max() {
    let h = eth_toshi_harness();
    let round = h
        .manager
        .create_round(RoundConfig {
            min_participants: 1,
            max_participants: 3,
            auto_start: false,
            ..Default::default()
        })
        .await
        .unwrap();

    let results = tokio::join!(
        h.manager.join_round(&round.id, join("0x1")),
        h.manager.join_round(&round.id, join("0x2")),
        h.manager.join_round(&round.id, join("0x3")),
        h.manager.join_round(&round.id, join("0x4")),
        h.manager.join_round(&round.id, join("0x5")),
    );
    let outcomes = [results.0, results.1, results.2, results.3, results.4];
    let admitted = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 3);
    for rejected in outcomes.iter().filter(|r| r.is_err()) {
        let err = rejected.as_ref().unwrap_err();
        assert!(err.to_string().contains("Round is full"), "got: {}", err);
    }

    let participants = h.manager.load_participants(&round.id).await.unwrap();
    assert_eq!(participants.len(), 3);
    let updated = h.manager.get_round(&round.id).await.unwrap();
    assert_eq!(updated.stats.total_participants, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn lifecycle_transitions_are_monotonic() {
    let h = eth_toshi_harness();
    let round = h
        .manager
        .create_round(RoundConfig {
            min_participants: 2,
            max_participants: 4,
            auto_start: false,
            ..Default::default()
        })
        .await
        .unwrap();

    // Cannot end or start prematurely.
    assert!(h.manager.end_round(&round.id).await.is_err());
    h.manager.join_round(&round.id, join("0x1")).await.unwrap();
    assert!(h.manager.start_round(&round.id).await.is_err());

    h.manager.join_round(&round.id, join("0x2")).await.unwrap();
    h.manager.start_round(&round.id).await.unwrap();

    // Active: no second start, no cancel, no joins.
    assert!(h.manager.start_round(&round.id).await.is_err());
    assert!(h.manager.cancel_round(&round.id).await.is_err());
    assert!(h.manager.join_round(&round.id, join("0x3")).await.is_err());

    h.manager.end_round(&round.id).await.unwrap();
    assert_eq!(
        h.manager.get_round(&round.id).await.unwrap().status,
        RoundStatus::Finished
    );

    // Finished is terminal.
    assert!(h.manager.end_round(&round.id).await.is_err());
    assert!(h.manager.start_round(&round.id).await.is_err());
    assert!(h.manager.join_round(&round.id, join("0x4")).await.is_err());

    // Cancellation is only for waiting rounds, and is terminal too.
    let second = h
        .manager
        .create_round(RoundConfig {
            auto_start: false,
            ..Default::default()
        })
        .await
        .unwrap();
    h.manager.cancel_round(&second.id).await.unwrap();
    assert_eq!(
        h.manager.get_round(&second.id).await.unwrap().status,
        RoundStatus::Cancelled
    );
    assert!(h.manager.join_round(&second.id, join("0x1")).await.is_err());
    assert!(h.manager.start_round(&second.id).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn round_ends_on_deadline() {
    let h = eth_toshi_harness();
    let round = h
        .manager
        .create_round(RoundConfig {
            duration_secs: 1,
            min_participants: 1,
            max_participants: 1,
            execution_interval_secs: 1,
            auto_start: false,
            ..Default::default()
        })
        .await
        .unwrap();
    h.manager.join_round(&round.id, join("0x1")).await.unwrap();
    h.manager.start_round(&round.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2_500)).await;

    let ended = h.manager.get_round(&round.id).await.unwrap();
    assert_eq!(ended.status, RoundStatus::Finished);

    let finished = h
        .manager
        .list_rounds(RoundListStatus::Finished, 10)
        .await
        .unwrap();
    assert!(finished.iter().any(|r| r.id == round.id));
    let running = h
        .manager
        .list_rounds(RoundListStatus::Running, 10)
        .await
        .unwrap();
    assert!(!running.iter().any(|r| r.id == round.id));

    // The scheduler is gone; nothing changes afterwards.
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    let stable = h.manager.get_round(&round.id).await.unwrap();
    assert_eq!(stable.end_at, ended.end_at);
}

/// Every upstream LLM call fails with a 5xx; the real paced client degrades
/// each signal to the repaired HOLD fallback and the round keeps running.
struct FailingApi;

#[async_trait]
impl ChatApi for FailingApi {
    async fn complete(
        &self,
        _request: &llm_client::api::ChatRequest,
    ) -> Result<String, LlmError> {
        Err(LlmError::Upstream {
            status: 500,
            message: "upstream down".to_string(),
        })
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn llm_outage_holds_everything_and_still_publishes() {
    let llm_settings = configuration::LlmSettings {
        min_interval_ms: 10,
        post_delay_ms: 5,
        backoff_ms: 50,
        ..Default::default()
    };
    let llm: Arc<dyn Llm> = Arc::new(LlmClient::new(Arc::new(FailingApi), &llm_settings));
    let feed = ScriptedFeed::new(&[("ETH", 3_000.0)]);
    let h = harness(feed, llm);

    let mut events_rx = h.manager.bus().subscribe();
    let round = h
        .manager
        .create_round(RoundConfig {
            duration_secs: 60,
            min_participants: 2,
            max_participants: 2,
            execution_interval_secs: 1,
            auto_start: false,
            ..Default::default()
        })
        .await
        .unwrap();
    h.manager.join_round(&round.id, join("0xaaa")).await.unwrap();
    h.manager.join_round(&round.id, join("0xbbb")).await.unwrap();
    h.manager.start_round(&round.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2_600)).await;
    h.manager.end_round(&round.id).await.unwrap();

    for wallet in ["0xaaa", "0xbbb"] {
        let participant = h.manager.get_participant(&round.id, wallet).await.unwrap();
        assert_eq!(participant.portfolio.trades, 0);
        assert!((participant.portfolio.cash - 10_000.0).abs() < 1e-9);

        let logs = h
            .manager
            .participant_logs(&round.id, wallet, 100)
            .await
            .unwrap();
        assert!(!logs.is_empty());
        for log in &logs {
            assert_eq!(log.action, SignalAction::Hold);
            assert!(!log.executed);
            assert!(log.confidence >= 4 && log.confidence <= 8);
            assert!(log.price > 0.0);
        }
    }

    // At least one leaderboard publish happened, with flat P&L.
    let mut saw_leaderboard = false;
    while let Ok(event) = events_rx.try_recv() {
        if let GameEvent::LeaderboardUpdate { entries, .. } = event {
            saw_leaderboard = true;
            for entry in entries {
                assert!(entry.pnl_percentage.abs() < 1e-9);
            }
        }
    }
    assert!(saw_leaderboard);
}

#[tokio::test(flavor = "multi_thread")]
async fn leaderboard_is_deterministic_for_identical_portfolios() {
    let feed = ScriptedFeed::new(&[("ETH", 3_000.0)]);
    let llm = ScriptedLlm::new(&["ETH"], &[("ETH", SignalAction::Hold, 5)]);
    let h = harness(feed, llm);

    let round = h
        .manager
        .create_round(RoundConfig {
            min_participants: 3,
            max_participants: 3,
            execution_interval_secs: 1,
            auto_start: false,
            ..Default::default()
        })
        .await
        .unwrap();
    for wallet in ["0xc", "0xa", "0xb"] {
        h.manager.join_round(&round.id, join(wallet)).await.unwrap();
    }
    h.manager.start_round(&round.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let first = h.manager.leaderboard(&round.id, 10).await.unwrap();
    let second = h.manager.leaderboard(&round.id, 10).await.unwrap();
    assert_eq!(first.len(), 3);
    let ranks: Vec<u32> = first.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
    let wallets_first: Vec<&str> = first.iter().map(|e| e.wallet.as_str()).collect();
    let wallets_second: Vec<&str> = second.iter().map(|e| e.wallet.as_str()).collect();
    assert_eq!(wallets_first, wallets_second);

    h.manager.end_round(&round.id).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn join_requires_exactly_one_strategy_source() {
    let h = eth_toshi_harness();
    let round = h
        .manager
        .create_round(RoundConfig {
            auto_start: false,
            ..Default::default()
        })
        .await
        .unwrap();

    let none = JoinRequest {
        wallet: "0x1".to_string(),
        ..Default::default()
    };
    assert!(h.manager.join_round(&round.id, none).await.is_err());

    let both = JoinRequest {
        wallet: "0x1".to_string(),
        strategy: Some("buy".to_string()),
        strategy_id: Some(1),
        ..Default::default()
    };
    assert!(h.manager.join_round(&round.id, both).await.is_err());

    h.manager.join_round(&round.id, join("0x1")).await.unwrap();
    let err = h
        .manager
        .join_round(&round.id, join("0x1"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Already joined"));

    let check = h.manager.can_join(&round.id, "0x1").await.unwrap();
    assert!(!check.can_join);
    assert_eq!(check.reason.as_deref(), Some("Already joined this round"));
    let check = h.manager.can_join(&round.id, "0x2").await.unwrap();
    assert!(check.can_join);
    let check = h.manager.can_join("missing", "0x2").await.unwrap();
    assert!(!check.can_join);
}

#[tokio::test(flavor = "multi_thread")]
async fn licensed_and_owned_bindings_enforce_ownership() {
    let h = eth_toshi_harness();
    let strategy = h
        .registry
        .register("0xowner", "buy ETH dips", 10.0, "Dips", "d", vec![])
        .await
        .unwrap();

    let round = h
        .manager
        .create_round(RoundConfig {
            min_participants: 1,
            max_participants: 4,
            auto_start: false,
            ..Default::default()
        })
        .await
        .unwrap();

    // The owner cannot license their own strategy.
    let err = h
        .manager
        .join_round(
            &round.id,
            JoinRequest {
                wallet: "0xowner".to_string(),
                license_strategy_id: Some(strategy.id),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Cannot license your own strategy"));

    // But can join with it as an owned strategy.
    let owner = h
        .manager
        .join_round(
            &round.id,
            JoinRequest {
                wallet: "0xowner".to_string(),
                strategy_id: Some(strategy.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(owner.binding.strategy_id(), Some(strategy.id));
    assert!(!owner.binding.is_licensed());

    // Someone else must license, not claim ownership.
    let err = h
        .manager
        .join_round(
            &round.id,
            JoinRequest {
                wallet: "0xother".to_string(),
                strategy_id: Some(strategy.id),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not owned"));

    let licensee = h
        .manager
        .join_round(
            &round.id,
            JoinRequest {
                wallet: "0xother".to_string(),
                license_strategy_id: Some(strategy.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(licensee.binding.is_licensed());
    let license = h
        .registry
        .get_license("0xother", &round.id)
        .await
        .unwrap()
        .expect("license persisted");
    assert_eq!(license.strategy_owner, "0xowner");
    assert_eq!(license.royalty_percent, 10.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn autostart_fires_once_when_round_fills() {
    let h = eth_toshi_harness();
    let round = h
        .manager
        .create_round(RoundConfig {
            min_participants: 2,
            max_participants: 2,
            execution_interval_secs: 60,
            auto_start: true,
            ..Default::default()
        })
        .await
        .unwrap();

    h.manager.join_round(&round.id, join("0x1")).await.unwrap();
    assert_eq!(
        h.manager.get_round(&round.id).await.unwrap().status,
        RoundStatus::Waiting
    );
    h.manager.join_round(&round.id, join("0x2")).await.unwrap();
    assert!(h.manager.get_round(&round.id).await.unwrap().autostart_armed);

    // The 5 s grace timer.
    tokio::time::sleep(Duration::from_millis(5_600)).await;
    let started = h.manager.get_round(&round.id).await.unwrap();
    assert_eq!(started.status, RoundStatus::Active);
    assert!(started.start_at.is_some());

    h.manager.end_round(&round.id).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn command_envelopes_wrap_success_and_failure() {
    let h = eth_toshi_harness();
    let service = CommandService::new(h.manager.clone());

    let created = service
        .create_round(RoundConfig {
            auto_start: false,
            ..Default::default()
        })
        .await;
    assert!(created.success);
    let round = created.data.unwrap();

    let viewed = service.get_round(&round.id).await;
    assert!(viewed.success);
    assert!(viewed.data.unwrap().current_participants.is_empty());

    let missing = service.get_round("nope").await;
    assert!(!missing.success);
    assert_eq!(missing.error.as_deref(), Some("not_found"));
    assert!(missing.message.is_some());

    let bad_status = service.list_rounds("bogus", 10).await;
    assert!(!bad_status.success);
    assert_eq!(bad_status.error.as_deref(), Some("validation_error"));

    let listed = service.list_rounds("active", 10).await;
    assert!(listed.success);
    assert!(listed.data.unwrap().iter().any(|r| r.id == round.id));

    let tokens = service.base_tokens();
    assert!(tokens.success);
    assert_eq!(tokens.data.unwrap(), vec!["ETH", "TOSHI"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn prompted_round_fills_defaults() {
    let feed = ScriptedFeed::new(&[("ETH", 3_000.0)]);
    let llm = Arc::new(ScriptedLlm {
        assets: vec!["ETH".to_string()],
        signals: HashMap::new(),
        prompt_data: RoundPromptData {
            title: Some("Degen hour".to_string()),
            duration_secs: Some(600),
            ..Default::default()
        },
    });
    let h = harness(feed, llm);
    let service = CommandService::new(h.manager.clone());

    let result = service
        .create_round_from_prompt("ten minute degen game", PromptOverrides::default())
        .await;
    assert!(result.success);
    let prompted = result.data.unwrap();
    assert_eq!(prompted.round.title, "Degen hour");
    assert_eq!(prompted.round.duration_ms, 600_000);
    assert_eq!(prompted.round.starting_balance, 10_000.0);
    assert_eq!(
        prompted.round.settings.allowed_tokens,
        vec!["ETH", "TOSHI", "DEGEN"]
    );
    assert_eq!(prompted.extracted.duration_secs, Some(600));
}

#[tokio::test(flavor = "multi_thread")]
async fn runs_against_failover_store_without_redis() {
    let store: Arc<dyn KvStore> = Arc::new(FailoverStore::in_memory());
    let feed = ScriptedFeed::new(&[("ETH", 3_000.0)]);
    let llm: Arc<dyn Llm> = ScriptedLlm::new(&["ETH"], &[("ETH", SignalAction::Hold, 5)]);
    let registry = Arc::new(StrategyRegistry::new(store.clone(), llm.clone()));
    let manager = RoundManager::new(store, feed, llm, registry, EventBus::new(16));

    let round = manager
        .create_round(RoundConfig {
            auto_start: false,
            ..Default::default()
        })
        .await
        .unwrap();
    let fetched = manager.get_round(&round.id).await.unwrap();
    assert_eq!(fetched.id, round.id);
    assert_eq!(fetched.status, RoundStatus::Waiting);
}
