use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Read(#[from] config::ConfigError),

    #[error("Invalid configuration value for {0}: {1}")]
    Invalid(String, String),

    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
}
