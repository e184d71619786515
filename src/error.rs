use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PioError {
    #[error("Pin unavailable: {0}")]
    PinUnavailable(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("I/O failure: {0}")]
    IoFailure(String),
    #[error("Pin closed: {0}")]
    Closed(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
