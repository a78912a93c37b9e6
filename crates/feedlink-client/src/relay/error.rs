//! Relay error types.

use std::time::Duration;

/// Errors that end a session instance. All of them are transient from the
/// relay's point of view: the supervisor logs them and reconnects.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("Read error: {0}")]
    Read(#[source] std::io::Error),

    #[error("Write error: {0}")]
    Write(#[source] std::io::Error),

    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] feedlink_core::Error),
}

impl SessionError {
    /// Whether the session failed before reaching `Connected`.
    pub const fn is_connect_failure(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::ConnectTimeout { .. })
    }
}

/// Invalid relay settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}
