//! Error types shared by collaborator clients and configuration loading.

use thiserror::Error;

/// Result type alias for collaborator calls.
pub type CollabResult<T> = Result<T, CollaboratorError>;

/// Failure talking to an external collaborator.
///
/// None of these are fatal: the engine logs them and skips the affected
/// effect for the current tick.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("{uri} answered with status {status}")]
    Status { uri: String, status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("ledger write failed: {0}")]
    Ledger(String),
}

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid duration {value:?} for {field}")]
    Duration { field: &'static str, value: String },

    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
