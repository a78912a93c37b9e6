//! Error types for the feedlink core library.

use thiserror::Error;

/// Result type alias using the feedlink core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for feedlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
