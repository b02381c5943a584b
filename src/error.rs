//! Error types for the esp-trace MCP server

use thiserror::Error;

/// Main error type for the esp-trace MCP server
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("OpenOCD server unreachable at {0}")]
    ServerUnreachable(String),

    #[error("A command is already in flight on this single-shot client, stop it to send more")]
    CommandInFlight,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Client is not connected")]
    NotConnected,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("{0} session is already running")]
    SessionBusy(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TraceError>;
