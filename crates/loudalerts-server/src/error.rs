//! Server error types.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned by the alert engine and its handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The event is not known to the engine (never alerted, or already pruned).
    #[error("unknown event: {id}")]
    UnknownEvent { id: String },

    /// The engine task is no longer running.
    #[error("alert engine is not running")]
    Stopped,
}

impl EngineError {
    /// Creates an unknown event error.
    pub fn unknown_event(id: impl Into<String>) -> Self {
        Self::UnknownEvent { id: id.into() }
    }
}

/// Errors raised by event sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading the underlying data failed.
    #[error("failed to read events from {origin}: {source}")]
    Read {
        origin: String,
        #[source]
        source: io::Error,
    },

    /// The data was read but could not be understood.
    #[error("failed to parse events from {origin}: {message}")]
    Parse { origin: String, message: String },
}

impl SourceError {
    /// Creates a read error.
    pub fn read(origin: impl Into<String>, source: io::Error) -> Self {
        Self::Read {
            origin: origin.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            origin: origin.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Engine error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Event source error.
    #[error("event source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_display() {
        assert_eq!(
            EngineError::unknown_event("evt-1").to_string(),
            "unknown event: evt-1"
        );
        assert_eq!(
            EngineError::Stopped.to_string(),
            "alert engine is not running"
        );
    }

    #[test]
    fn source_error_display() {
        let err = SourceError::parse("events.json", "expected array");
        assert_eq!(
            err.to_string(),
            "failed to parse events from events.json: expected array"
        );
    }

    #[test]
    fn server_error_from_engine() {
        let err: ServerError = EngineError::Stopped.into();
        assert!(matches!(err, ServerError::Engine(EngineError::Stopped)));
    }
}
