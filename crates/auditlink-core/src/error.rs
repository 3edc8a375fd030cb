//! Error types for `AuditLink` core library.

use thiserror::Error;

/// Result type alias using `AuditLink` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `AuditLink` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed contract or wallet address
    #[error("Invalid address '{0}': expected 0x followed by 40 hex characters")]
    InvalidAddress(String),

    /// Empty source code or otherwise unusable audit input
    #[error("Invalid audit input: {0}")]
    InvalidInput(String),

    /// Unknown network name
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
