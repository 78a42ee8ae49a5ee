use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM upstream rate limited the request")]
    RateLimited,

    #[error("LLM upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM response carried no content")]
    MissingContent,

    #[error("LLM request queue is closed")]
    QueueClosed,
}
