use chrono::Utc;
use core_types::{License, ParsedStrategy, Strategy, StrategyOutcome, StrategyStats};
use llm_client::Llm;
use std::sync::Arc;
use std::time::Duration;
use store::KvStore;

pub mod error;

// Re-export the core types to provide a clean public API.
pub use error::RegistryError;

/// Registered strategies live for a year.
const STRATEGY_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);
/// Licenses live for thirty days.
const LICENSE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// Page size for keyspace scans.
const SCAN_PAGE: usize = 100;

const MIN_ROYALTY: f64 = 5.0;
const MAX_ROYALTY: f64 = 50.0;

fn strategy_key(id: u64) -> String {
    format!("strategy:{}", id)
}

fn owner_index_key(owner: &str) -> String {
    format!("user:strategies:{}", owner)
}

fn licenses_key(id: u64) -> String {
    format!("strategy:{}:licenses", id)
}

fn license_key(licensee: &str, round_id: &str) -> String {
    format!("license:{}:{}", licensee, round_id)
}

/// Owns strategy entities: registration, retrieval, stats, licensing and
/// marketplace ranking. All state lives in the store; the registry itself is
/// stateless and cheap to clone behind an `Arc`.
pub struct StrategyRegistry {
    store: Arc<dyn KvStore>,
    llm: Arc<dyn Llm>,
}

impl StrategyRegistry {
    pub fn new(store: Arc<dyn KvStore>, llm: Arc<dyn Llm>) -> Self {
        Self { store, llm }
    }

    /// Registers a new strategy for `owner`: assigns the next id, parses the
    /// prose through the LLM, persists the record and indexes it under the
    /// owner.
    pub async fn register(
        &self,
        owner: &str,
        text: &str,
        royalty_percent: f64,
        name: &str,
        description: &str,
        tags: Vec<String>,
    ) -> Result<Strategy, RegistryError> {
        if !(MIN_ROYALTY..=MAX_ROYALTY).contains(&royalty_percent) {
            return Err(RegistryError::Validation(format!(
                "Royalty must be between {}% and {}%",
                MIN_ROYALTY, MAX_ROYALTY
            )));
        }
        if text.trim().is_empty() {
            return Err(RegistryError::Validation(
                "Strategy text must not be empty".to_string(),
            ));
        }

        let id = self.store.incr("strategy:counter").await? as u64;
        let parsed = self.llm.parse_strategy(text).await?;

        let now = Utc::now();
        let strategy = Strategy {
            id,
            owner: owner.to_string(),
            text: text.to_string(),
            parsed,
            royalty_percent,
            name: name.to_string(),
            description: description.to_string(),
            stats: StrategyStats::default(),
            active: true,
            verified: false,
            tags,
            created_at: now,
            updated_at: now,
        };

        self.persist(&strategy).await?;
        self.store
            .sadd(&owner_index_key(owner), &id.to_string())
            .await?;

        tracing::info!(strategy_id = id, owner = %owner, "strategy registered");
        Ok(strategy)
    }

    pub async fn get(&self, id: u64) -> Result<Strategy, RegistryError> {
        let raw = self
            .store
            .get(&strategy_key(id))
            .await?
            .ok_or(RegistryError::NotFound(id))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The parsed form of a registered strategy.
    pub async fn parse_for(&self, id: u64) -> Result<ParsedStrategy, RegistryError> {
        Ok(self.get(id).await?.parsed)
    }

    pub async fn list_by_owner(&self, owner: &str) -> Result<Vec<Strategy>, RegistryError> {
        let ids = self.store.smembers(&owner_index_key(owner)).await?;
        let mut strategies = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(id) = id.parse::<u64>() else { continue };
            match self.get(id).await {
                Ok(strategy) => strategies.push(strategy),
                Err(RegistryError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        strategies.sort_by_key(|s| s.id);
        Ok(strategies)
    }

    /// The marketplace ranking: active, verified strategies ordered by
    /// `win_rate × total_uses` descending.
    pub async fn list_top(&self, limit: usize) -> Result<Vec<Strategy>, RegistryError> {
        let mut strategies: Vec<Strategy> = self
            .scan_strategies()
            .await?
            .into_iter()
            .filter(|s| s.active && s.verified)
            .collect();
        strategies.sort_by(|a, b| {
            let score_a = a.stats.win_rate * a.stats.total_uses as f64;
            let score_b = b.stats.win_rate * b.stats.total_uses as f64;
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        strategies.truncate(limit);
        Ok(strategies)
    }

    /// Case-insensitive substring search over name, description, tags and the
    /// original text of active strategies.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Strategy>, RegistryError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut matches: Vec<Strategy> = self
            .scan_strategies()
            .await?
            .into_iter()
            .filter(|s| s.active)
            .filter(|s| {
                s.name.to_lowercase().contains(&needle)
                    || s.description.to_lowercase().contains(&needle)
                    || s.text.to_lowercase().contains(&needle)
                    || s.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .collect();
        matches.sort_by_key(|s| s.id);
        matches.truncate(limit);
        Ok(matches)
    }

    /// Folds one round outcome into a strategy's aggregate stats.
    pub async fn update_stats(
        &self,
        id: u64,
        outcome: StrategyOutcome,
    ) -> Result<Strategy, RegistryError> {
        let mut strategy = self.get(id).await?;
        let stats = &mut strategy.stats;

        stats.total_uses += 1;
        stats.total_trades += outcome.trades;
        if outcome.win {
            stats.successful_trades += 1;
        }
        stats.total_earnings += outcome.earnings;
        stats.win_rate = if stats.total_uses > 0 {
            stats.successful_trades as f64 / stats.total_uses as f64 * 100.0
        } else {
            0.0
        };
        // Running mean over uses.
        stats.average_return = (stats.average_return * (stats.total_uses - 1) as f64
            + outcome.return_pct)
            / stats.total_uses as f64;
        if outcome.return_pct > stats.best_performance {
            stats.best_performance = outcome.return_pct;
        }
        strategy.updated_at = Utc::now();

        self.persist(&strategy).await?;
        Ok(strategy)
    }

    /// Issues a per-round license on another wallet's strategy.
    ///
    /// The strategy must exist and be active, the licensee must not be the
    /// owner, and a wallet holds at most one license per round. The royalty
    /// percent is captured at issuance.
    pub async fn license(
        &self,
        licensee: &str,
        strategy_id: u64,
        round_id: &str,
    ) -> Result<License, RegistryError> {
        let strategy = self.get(strategy_id).await?;
        if !strategy.active {
            return Err(RegistryError::Validation(format!(
                "Strategy {} is not active",
                strategy_id
            )));
        }
        if strategy.owner == licensee {
            return Err(RegistryError::Validation(
                "Cannot license your own strategy".to_string(),
            ));
        }
        if self.get_license(licensee, round_id).await?.is_some() {
            return Err(RegistryError::Conflict(
                "Already licensed a strategy for this round".to_string(),
            ));
        }

        let license = License {
            licensee: licensee.to_string(),
            strategy_id,
            round_id: round_id.to_string(),
            strategy_owner: strategy.owner.clone(),
            royalty_percent: strategy.royalty_percent,
            profit_shared: 0.0,
            active: true,
            created_at: Utc::now(),
        };

        self.store
            .set_ex(
                &license_key(licensee, round_id),
                &serde_json::to_string(&license)?,
                LICENSE_TTL,
            )
            .await?;
        self.store
            .sadd(&licenses_key(strategy_id), licensee)
            .await?;

        tracing::info!(
            strategy_id,
            licensee = %licensee,
            round_id = %round_id,
            royalty = license.royalty_percent,
            "strategy licensed"
        );
        Ok(license)
    }

    pub async fn get_license(
        &self,
        licensee: &str,
        round_id: &str,
    ) -> Result<Option<License>, RegistryError> {
        match self.store.get(&license_key(licensee, round_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Accrues a royalty payment onto an existing license record.
    pub async fn accrue_royalty(
        &self,
        licensee: &str,
        round_id: &str,
        amount: f64,
    ) -> Result<(), RegistryError> {
        let Some(mut license) = self.get_license(licensee, round_id).await? else {
            return Ok(());
        };
        license.profit_shared += amount;
        self.store
            .set_ex(
                &license_key(licensee, round_id),
                &serde_json::to_string(&license)?,
                LICENSE_TTL,
            )
            .await?;
        Ok(())
    }

    /// Owner-only activation toggle.
    pub async fn set_status(
        &self,
        id: u64,
        owner: &str,
        active: bool,
    ) -> Result<Strategy, RegistryError> {
        let mut strategy = self.get(id).await?;
        if strategy.owner != owner {
            return Err(RegistryError::Conflict(
                "Only the owner can change strategy status".to_string(),
            ));
        }
        strategy.active = active;
        strategy.updated_at = Utc::now();
        self.persist(&strategy).await?;
        Ok(strategy)
    }

    /// Administrator-only verification toggle.
    pub async fn set_verified(&self, id: u64, verified: bool) -> Result<Strategy, RegistryError> {
        let mut strategy = self.get(id).await?;
        strategy.verified = verified;
        strategy.updated_at = Utc::now();
        self.persist(&strategy).await?;
        Ok(strategy)
    }

    async fn persist(&self, strategy: &Strategy) -> Result<(), RegistryError> {
        self.store
            .set_ex(
                &strategy_key(strategy.id),
                &serde_json::to_string(strategy)?,
                STRATEGY_TTL,
            )
            .await?;
        Ok(())
    }

    /// Loads every strategy record, paging through the keyspace.
    async fn scan_strategies(&self) -> Result<Vec<Strategy>, RegistryError> {
        let keys = self.store.keys("strategy:*").await?;
        // The pattern also matches the counter and license-index keys; only
        // `strategy:<id>` is a record.
        let ids: Vec<u64> = keys
            .iter()
            .filter_map(|k| k.strip_prefix("strategy:"))
            .filter_map(|rest| rest.parse::<u64>().ok())
            .collect();

        let mut strategies = Vec::with_capacity(ids.len());
        for page in ids.chunks(SCAN_PAGE) {
            for &id in page {
                match self.get(id).await {
                    Ok(strategy) => strategies.push(strategy),
                    Err(RegistryError::NotFound(_)) => continue,
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(strategies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_types::{MarketSnapshot, RoundPromptData, Signal};
    use llm_client::LlmError;
    use store::MemoryStore;

    struct StubLlm;

    #[async_trait]
    impl Llm for StubLlm {
        async fn parse_strategy(&self, _text: &str) -> Result<ParsedStrategy, LlmError> {
            Ok(ParsedStrategy::default())
        }

        async fn generate_signal(
            &self,
            _snapshot: &MarketSnapshot,
            _parsed: &ParsedStrategy,
        ) -> Result<Signal, LlmError> {
            unreachable!("registry never generates signals")
        }

        async fn parse_round_prompt(&self, _query: &str) -> Result<RoundPromptData, LlmError> {
            unreachable!("registry never parses round prompts")
        }
    }

    fn registry() -> StrategyRegistry {
        StrategyRegistry::new(Arc::new(MemoryStore::new()), Arc::new(StubLlm))
    }

    #[tokio::test]
    async fn register_assigns_monotonic_ids_and_indexes_owner() {
        let registry = registry();
        let first = registry
            .register("0xaaa", "buy ETH dips", 10.0, "Dips", "buy dips", vec![])
            .await
            .unwrap();
        let second = registry
            .register("0xaaa", "sell TOSHI rips", 10.0, "Rips", "sell rips", vec![])
            .await
            .unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        let owned = registry.list_by_owner("0xaaa").await.unwrap();
        assert_eq!(owned.len(), 2);
        assert_eq!(owned[0].id, 1);
    }

    #[tokio::test]
    async fn royalty_bounds_are_enforced() {
        let registry = registry();
        for royalty in [0.0, 4.9, 50.1, 100.0] {
            let err = registry
                .register("0xaaa", "strategy", royalty, "n", "d", vec![])
                .await
                .unwrap_err();
            assert!(matches!(err, RegistryError::Validation(_)), "royalty {}", royalty);
        }
        assert!(registry.register("0xaaa", "s", 5.0, "n", "d", vec![]).await.is_ok());
        assert!(registry.register("0xaaa", "s", 50.0, "n", "d", vec![]).await.is_ok());
    }

    #[tokio::test]
    async fn cannot_license_own_strategy() {
        let registry = registry();
        let strategy = registry
            .register("0xaaa", "buy ETH", 10.0, "n", "d", vec![])
            .await
            .unwrap();

        let err = registry.license("0xaaa", strategy.id, "r1").await.unwrap_err();
        match err {
            RegistryError::Validation(msg) => {
                assert_eq!(msg, "Cannot license your own strategy")
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn one_license_per_round_per_wallet() {
        let registry = registry();
        let strategy = registry
            .register("0xaaa", "buy ETH", 10.0, "n", "d", vec![])
            .await
            .unwrap();

        let license = registry.license("0xbbb", strategy.id, "r1").await.unwrap();
        assert_eq!(license.royalty_percent, 10.0);
        assert_eq!(license.strategy_owner, "0xaaa");

        let err = registry.license("0xbbb", strategy.id, "r1").await.unwrap_err();
        match err {
            RegistryError::Conflict(msg) => {
                assert_eq!(msg, "Already licensed a strategy for this round")
            }
            other => panic!("expected conflict error, got {:?}", other),
        }

        // A different round is fine.
        assert!(registry.license("0xbbb", strategy.id, "r2").await.is_ok());
    }

    #[tokio::test]
    async fn license_captures_royalty_at_issuance() {
        let registry = registry();
        let strategy = registry
            .register("0xaaa", "buy ETH", 20.0, "n", "d", vec![])
            .await
            .unwrap();
        let license = registry.license("0xbbb", strategy.id, "r1").await.unwrap();
        assert_eq!(license.royalty_percent, 20.0);

        // Raising the royalty later must not alter the issued license.
        let mut updated = registry.get(strategy.id).await.unwrap();
        updated.royalty_percent = 50.0;
        registry.persist(&updated).await.unwrap();
        let stored = registry.get_license("0xbbb", "r1").await.unwrap().unwrap();
        assert_eq!(stored.royalty_percent, 20.0);
    }

    #[tokio::test]
    async fn inactive_strategy_cannot_be_licensed() {
        let registry = registry();
        let strategy = registry
            .register("0xaaa", "buy ETH", 10.0, "n", "d", vec![])
            .await
            .unwrap();
        registry.set_status(strategy.id, "0xaaa", false).await.unwrap();

        let err = registry.license("0xbbb", strategy.id, "r1").await.unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
    }

    #[tokio::test]
    async fn set_status_rejects_non_owner() {
        let registry = registry();
        let strategy = registry
            .register("0xaaa", "buy ETH", 10.0, "n", "d", vec![])
            .await
            .unwrap();
        let err = registry
            .set_status(strategy.id, "0xbbb", false)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_stats_accumulates() {
        let registry = registry();
        let strategy = registry
            .register("0xaaa", "buy ETH", 10.0, "n", "d", vec![])
            .await
            .unwrap();

        let after_win = registry
            .update_stats(
                strategy.id,
                StrategyOutcome {
                    trades: 4,
                    win: true,
                    earnings: 12.5,
                    return_pct: 8.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(after_win.stats.total_uses, 1);
        assert_eq!(after_win.stats.total_trades, 4);
        assert_eq!(after_win.stats.successful_trades, 1);
        assert!((after_win.stats.win_rate - 100.0).abs() < 1e-9);
        assert!((after_win.stats.average_return - 8.0).abs() < 1e-9);
        assert!((after_win.stats.best_performance - 8.0).abs() < 1e-9);

        let after_loss = registry
            .update_stats(
                strategy.id,
                StrategyOutcome {
                    trades: 2,
                    win: false,
                    earnings: 0.0,
                    return_pct: -3.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(after_loss.stats.total_uses, 2);
        assert_eq!(after_loss.stats.total_trades, 6);
        assert!((after_loss.stats.win_rate - 50.0).abs() < 1e-9);
        assert!((after_loss.stats.average_return - 2.5).abs() < 1e-9);
        assert!((after_loss.stats.best_performance - 8.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn list_top_filters_and_ranks() {
        let registry = registry();
        let a = registry.register("0xaaa", "a", 10.0, "a", "", vec![]).await.unwrap();
        let b = registry.register("0xbbb", "b", 10.0, "b", "", vec![]).await.unwrap();
        let c = registry.register("0xccc", "c", 10.0, "c", "", vec![]).await.unwrap();

        // a: verified, strong record. b: verified, weaker. c: unverified.
        registry.set_verified(a.id, true).await.unwrap();
        registry.set_verified(b.id, true).await.unwrap();
        for _ in 0..3 {
            registry
                .update_stats(a.id, StrategyOutcome { trades: 1, win: true, earnings: 0.0, return_pct: 5.0 })
                .await
                .unwrap();
        }
        registry
            .update_stats(b.id, StrategyOutcome { trades: 1, win: true, earnings: 0.0, return_pct: 5.0 })
            .await
            .unwrap();
        registry
            .update_stats(c.id, StrategyOutcome { trades: 1, win: true, earnings: 0.0, return_pct: 5.0 })
            .await
            .unwrap();

        let top = registry.list_top(10).await.unwrap();
        let ids: Vec<u64> = top.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn search_matches_name_description_and_tags() {
        let registry = registry();
        registry
            .register("0xaaa", "ride the trend", 10.0, "Momentum", "trend following", vec!["trend".to_string()])
            .await
            .unwrap();
        registry
            .register("0xbbb", "mean reversion on TOSHI", 10.0, "Reversion", "fade extremes", vec![])
            .await
            .unwrap();

        assert_eq!(registry.search("trend", 10).await.unwrap().len(), 1);
        assert_eq!(registry.search("toshi", 10).await.unwrap().len(), 1);
        assert_eq!(registry.search("nothing", 10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn accrue_royalty_updates_profit_shared() {
        let registry = registry();
        let strategy = registry
            .register("0xaaa", "buy ETH", 10.0, "n", "d", vec![])
            .await
            .unwrap();
        registry.license("0xbbb", strategy.id, "r1").await.unwrap();

        registry.accrue_royalty("0xbbb", "r1", 42.0).await.unwrap();
        registry.accrue_royalty("0xbbb", "r1", 8.0).await.unwrap();
        let license = registry.get_license("0xbbb", "r1").await.unwrap().unwrap();
        assert!((license.profit_shared - 50.0).abs() < 1e-9);
    }
}
