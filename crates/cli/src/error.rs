//! Structured errors for the stashline CLI.

use stashline_client::{BuildError, CallError, RequestError};
use stashline_core::ConfigError;

/// Errors surfaced by CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Bad command-line input (header syntax, method, request shape).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Cache(#[from] stashline_core::Error),

    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Setup(#[from] BuildError),

    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("OUTPUT_ERROR: {0}")]
    Output(#[from] serde_json::Error),
}

impl From<RequestError> for CliError {
    fn from(err: RequestError) -> Self {
        CliError::InvalidInput(err.to_string())
    }
}
