use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Strategy not found: {0}")]
    NotFound(u64),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Llm(#[from] llm_client::LlmError),

    #[error("Corrupt strategy record: {0}")]
    Corrupt(#[from] serde_json::Error),
}
