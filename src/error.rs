use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DebounceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("GPIO error: {0}")]
    Gpio(String),
}
