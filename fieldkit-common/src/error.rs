//! Common error types for fieldkit

use thiserror::Error;

/// Common result type for fieldkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across fieldkit crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Remote service answered with a JSON-RPC error object
    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },

    /// Remote service rejected the session token; a fresh one has been issued
    #[error("Session expired")]
    SessionExpired,

    /// Transport failure talking to the remote service
    #[error("Network error: {0}")]
    Network(String),

    /// Operation did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Capability never became available on a record
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Field is not registered on the record
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// A set filter rejected or failed to transform a value
    #[error("Filter error: {0}")]
    Filter(String),

    /// Invalid input value or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
