use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("Invalid stored value at {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}
