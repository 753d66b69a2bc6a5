use std::time::Duration;

use thiserror::Error;

/// Failure while opening or re-synchronizing a session.
#[derive(Debug, Clone, Error)]
pub enum ConnError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session is closed")]
    Closed,
}

/// Failure of a single statement.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Error reported by the server for the running statement.
    #[error("Server error {code}: {message}")]
    Server { code: u32, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The session ended while the statement was in flight.
    #[error("Session disconnected: {0}")]
    Disconnected(String),

    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Connection(#[from] ConnError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl ExecError {
    /// Message reported by the server, if this is a server-side failure.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ExecError::Server { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    /// Every handle is lent out or recovering. Acquire never waits.
    #[error("Connection pool exhausted (capacity {capacity})")]
    Exhausted { capacity: usize },

    #[error("Connection pool is closed")]
    Closed,

    #[error("Connection belongs to a different pool")]
    ForeignConnection,

    #[error("Pool configuration error: {0}")]
    Configuration(String),

    #[error("Failed to connect pooled handle {index}: {source}")]
    Initialization {
        index: usize,
        #[source]
        source: ConnError,
    },
}

/// Single error type for applications that do not care which layer failed.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error(transparent)]
    Connection(#[from] ConnError),

    #[error(transparent)]
    Execution(#[from] ExecError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}
