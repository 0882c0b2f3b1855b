// Run-level error type
// Everything that aborts a run before or between phases. Failures of individual jobs are
// recorded in their executor state instead.

use thiserror::Error;

use crate::domain::DomainError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Graph, argument, template or path problem
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Graph persistence, output folder creation, input scanning
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The run cannot continue with what it was given
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
