//! Error types for the MapView environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to the robot backend.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Request could not be sent or the connection dropped
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    /// Payload serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend is offline (simulated outage or refused connection)
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// Requested resource does not exist on the backend
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a serialization error.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Creates an unreachable error.
    pub fn unreachable(target: impl std::fmt::Display) -> Self {
        Self::Unreachable(target.to_string())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}
