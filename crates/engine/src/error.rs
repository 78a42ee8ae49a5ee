use strategy_registry::RegistryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Llm(#[from] llm_client::LlmError),

    #[error("Corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation(msg) => EngineError::Validation(msg),
            RegistryError::Conflict(msg) => EngineError::Conflict(msg),
            RegistryError::NotFound(id) => EngineError::NotFound(format!("Strategy not found: {}", id)),
            RegistryError::Store(err) => EngineError::Store(err),
            RegistryError::Llm(err) => EngineError::Llm(err),
            RegistryError::Corrupt(err) => EngineError::Corrupt(err),
        }
    }
}

impl From<market_data::FeedError> for EngineError {
    fn from(err: market_data::FeedError) -> Self {
        match err {
            market_data::FeedError::SymbolNotSupported(symbol) => {
                EngineError::Validation(format!("Symbol not supported: {}", symbol))
            }
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl EngineError {
    /// Stable error kind for the command-result envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::Conflict(_) => "conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::Store(store::StoreError::Unavailable(_)) => "store_unavailable",
            EngineError::Store(_) => "store_error",
            EngineError::Llm(_) => "llm_error",
            EngineError::Corrupt(_) | EngineError::Internal(_) => "internal_error",
        }
    }
}
