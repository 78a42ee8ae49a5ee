use anyhow::Result;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use configuration::{Settings, StoreMode};
use engine::{CommandService, PromptOverrides, RoundConfig, RoundListStatus, RoundManager};
use events::EventBus;
use llm_client::{Llm, LlmClient};
use market_data::{MarketData, PriceFeed};
use std::sync::Arc;
use store::{FailoverStore, KvStore, RedisStore};
use strategy_registry::StrategyRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; the configuration layer has defaults for everything.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let settings = configuration::load_settings(cli.config.as_deref())?;
    configuration::init_tracing(&settings.logging)?;

    tracing::info!("Arena engine starting");
    let service = build_service(&settings).await?;

    match cli.command {
        Commands::Serve => handle_serve(service).await?,
        Commands::Price(args) => print_json(&service.base_price(&args.symbol).await)?,
        Commands::Tokens => print_json(&service.base_tokens())?,
        Commands::Trending(args) => print_json(&service.base_trending(args.limit).await)?,
        Commands::ParseStrategy(args) => print_json(&service.parse_strategy(&args.text).await)?,
        Commands::Signal(args) => {
            print_json(&service.signal(&args.symbol, &args.strategy).await)?
        }
        Commands::CreateRound(args) => {
            let config = RoundConfig {
                title: args.title,
                duration_secs: args.duration,
                starting_balance: args.starting_balance,
                min_participants: args.min_participants,
                max_participants: args.max_participants,
                execution_interval_secs: args.interval,
                allowed_tokens: args.tokens,
                auto_start: !args.no_auto_start,
                ..Default::default()
            };
            print_json(&service.create_round(config).await)?
        }
        Commands::Prompt(args) => {
            print_json(
                &service
                    .create_round_from_prompt(&args.query, PromptOverrides::default())
                    .await,
            )?
        }
        Commands::Rounds(args) => print_json(&service.list_rounds(&args.status, args.limit).await)?,
        Commands::Leaderboard(args) => handle_leaderboard(&service, &args).await?,
    }

    Ok(())
}

/// Assembles the full stack from settings: store (Redis with in-memory
/// failover), price feed, paced LLM client, registry, event bus, manager.
async fn build_service(settings: &Settings) -> Result<CommandService> {
    let primary = match settings.store.connection_url() {
        Some(url) => match RedisStore::connect(&url).await {
            Ok(store) => {
                tracing::info!(url = %url, "connected to external store");
                Some(store)
            }
            Err(err) if settings.store.mode == StoreMode::Permissive => {
                tracing::warn!(error = %err, "external store unreachable, running in-memory");
                None
            }
            Err(err) => return Err(err.into()),
        },
        None => {
            tracing::info!("no external store configured, running in-memory");
            None
        }
    };
    let store: Arc<dyn KvStore> =
        Arc::new(FailoverStore::new(primary, settings.store.mode));
    store.ping().await?;

    let feed: Arc<dyn MarketData> = Arc::new(PriceFeed::new(settings.market.clone()));
    let llm: Arc<dyn Llm> = Arc::new(LlmClient::from_settings(&settings.llm));
    let registry = Arc::new(StrategyRegistry::new(store.clone(), llm.clone()));
    let bus = EventBus::default();

    let manager = RoundManager::new(store, feed, llm, registry, bus);
    Ok(CommandService::new(manager))
}

/// Runs the engine as a long-lived service: relays bus events into the log
/// and ends any running rounds cleanly on Ctrl-C.
async fn handle_serve(service: CommandService) -> Result<()> {
    let mut events = service.manager().bus().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(round_id = %event.round_id(), event = ?event, "event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event log fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tracing::info!("engine running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down, ending running rounds");

    let running = service
        .manager()
        .list_rounds(RoundListStatus::Running, usize::MAX)
        .await?;
    for round in running {
        if let Err(err) = service.manager().end_round(&round.id).await {
            tracing::warn!(round_id = %round.id, error = %err, "failed to end round on shutdown");
        }
    }
    Ok(())
}

async fn handle_leaderboard(service: &CommandService, args: &LeaderboardArgs) -> Result<()> {
    let result = service
        .get_enhanced_leaderboard(&args.round_id, args.limit)
        .await;
    if !result.success {
        print_json(&result)?;
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Rank", "Wallet", "Name", "P&L %", "Total Value", "Trades", "Win %", "Score", "Grade",
        ]);
    for row in result.data.unwrap_or_default() {
        table.add_row(vec![
            Cell::new(row.entry.rank),
            Cell::new(&row.entry.wallet),
            Cell::new(&row.entry.username),
            Cell::new(format!("{:+.2}", row.entry.pnl_percentage)),
            Cell::new(format!("{:.2}", row.entry.total_value)),
            Cell::new(row.entry.trades),
            Cell::new(format!("{:.1}", row.entry.win_rate)),
            Cell::new(format!("{:.2}", row.profit_score)),
            Cell::new(&row.grade),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ==============================================================================
// CLI Structure
// ==============================================================================

#[derive(Parser)]
#[command(author, version, about = "Multi-player trading simulation rounds", long_about = None)]
struct Cli {
    /// Path to a configuration file (defaults to arena.toml when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine as a long-lived service.
    Serve,
    /// Fetch a market snapshot for one symbol.
    Price(PriceArgs),
    /// List the supported symbols.
    Tokens,
    /// List trending symbols.
    Trending(TrendingArgs),
    /// Parse a natural-language strategy.
    ParseStrategy(ParseStrategyArgs),
    /// One-shot signal for a symbol under a strategy.
    Signal(SignalArgs),
    /// Create a round from explicit parameters.
    CreateRound(CreateRoundArgs),
    /// Create a round from a natural-language request.
    Prompt(PromptArgs),
    /// List rounds by status.
    Rounds(RoundsArgs),
    /// Render a round's leaderboard.
    Leaderboard(LeaderboardArgs),
}

#[derive(Parser)]
struct PriceArgs {
    #[arg(long)]
    symbol: String,
}

#[derive(Parser)]
struct TrendingArgs {
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

#[derive(Parser)]
struct ParseStrategyArgs {
    #[arg(long)]
    text: String,
}

#[derive(Parser)]
struct SignalArgs {
    #[arg(long)]
    symbol: String,
    #[arg(long)]
    strategy: String,
}

#[derive(Parser)]
struct CreateRoundArgs {
    #[arg(long, default_value = "Trading Round")]
    title: String,
    /// Round duration in seconds.
    #[arg(long, default_value_t = 300)]
    duration: u64,
    #[arg(long, default_value_t = 10_000.0)]
    starting_balance: f64,
    #[arg(long, default_value_t = 2)]
    min_participants: u32,
    #[arg(long, default_value_t = 10)]
    max_participants: u32,
    /// Strategy execution cadence in seconds.
    #[arg(long, default_value_t = 15)]
    interval: u64,
    /// Symbols participants may trade; empty allows the whole whitelist.
    #[arg(long)]
    tokens: Vec<String>,
    #[arg(long)]
    no_auto_start: bool,
}

#[derive(Parser)]
struct PromptArgs {
    #[arg(long)]
    query: String,
}

#[derive(Parser)]
struct RoundsArgs {
    /// One of: active, running, finished.
    #[arg(long, default_value = "active")]
    status: String,
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Parser)]
struct LeaderboardArgs {
    #[arg(long)]
    round_id: String,
    #[arg(long, default_value_t = 10)]
    limit: usize,
}
