//! Client error types.

use thiserror::Error;

use loudalerts_core::TracingError;
use loudalerts_server::{EngineError, ServerError, SourceError};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A command-line value is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The alert engine failed or stopped.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Reading events failed.
    #[error("event source error: {0}")]
    Source(#[from] SourceError),

    /// Daemon error.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Logging could not be set up.
    #[error("tracing error: {0}")]
    Tracing(#[from] TracingError),
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
