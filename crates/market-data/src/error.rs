use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Symbol not supported: {0}")]
    SymbolNotSupported(String),

    #[error("Price upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Price upstream returned unusable data: {0}")]
    Upstream(String),
}
