// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid operator argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operator chain: {0}")]
    InvalidChain(String),

    #[error("Malformed graph markup: {0}")]
    Markup(String),

    #[error("Unknown source reference: {0}")]
    UnknownReference(String),

    #[error("Step index {index} out of range (graph has {len} steps)")]
    StepIndexOutOfRange { index: usize, len: usize },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
