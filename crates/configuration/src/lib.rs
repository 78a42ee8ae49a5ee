use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    LlmSettings, LoggingSettings, MarketSettings, Settings, StoreMode, StoreSettings,
};

/// Loads the application configuration.
///
/// Reads `arena.toml` when present, then applies `ARENA_`-prefixed environment
/// variables on top (e.g. `ARENA_LLM__API_KEY` overrides `llm.api_key`).
/// Every field has a default, so running with no file and no environment
/// yields a working in-memory configuration.
pub fn load_settings(path: Option<&str>) -> Result<Settings, ConfigError> {
    let file = config::File::with_name(path.unwrap_or("arena")).required(false);
    let builder = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("ARENA")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings = builder.try_deserialize::<Settings>()?;
    Ok(settings)
}

/// Initializes the global tracing subscriber from the logging settings.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(logging: &LoggingSettings) -> Result<(), ConfigError> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.level.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| ConfigError::Tracing(e.to_string()))?;

    Ok(())
}
