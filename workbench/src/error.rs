//! Error types for the workbench control plane

use proxy_common::ParseError;
use thiserror::Error;

/// Main error type for workbench operations
#[derive(Debug, Error)]
pub enum WorkbenchError {
    #[error("No intercepted request with id {id}")]
    UnknownRequest { id: String },

    #[error("Request parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Push channel error: {details}")]
    Channel { details: String },

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session coordinator is not running")]
    CoordinatorClosed,
}

impl WorkbenchError {
    pub fn unknown_request(id: impl Into<String>) -> Self {
        Self::UnknownRequest { id: id.into() }
    }

    pub fn channel(details: impl ToString) -> Self {
        Self::Channel {
            details: details.to_string(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration { reason: reason.into() }
    }
}

impl From<sqlx::migrate::MigrateError> for WorkbenchError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(sqlx::Error::Migrate(Box::new(err)))
    }
}

pub type WorkbenchResult<T> = Result<T, WorkbenchError>;
