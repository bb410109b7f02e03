use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load hospital configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Invalid hospital configuration: {0}")]
    ValidationError(String),

    #[error("Failed to initialise logging: {0}")]
    LoggingError(String),
}
