//! Error types for the attack engine

use proxy_common::ParseError;
use thiserror::Error;

/// Failure of a single outbound request
///
/// Always carries a human-readable message; never a partial response.
#[derive(Debug, Error, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DispatchError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl DispatchError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }
}

/// Main error type for attack engine operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttackError {
    #[error("Input validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("An attack is already running")]
    AlreadyRunning,

    #[error("Request parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Request dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl AttackError {
    /// Create a validation error with field and reason
    pub fn validation(field: &str, reason: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for attack engine operations
pub type AttackResult<T> = Result<T, AttackError>;
