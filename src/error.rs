use thiserror::Error;

use crate::models::Status;

/// Every failure the ticket engine can surface to its caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input: short fields, missing category, unknown enum text.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Status table violation, including a request to stay in the same status.
    #[error("Cannot move ticket from {from} to {to}")]
    InvalidTransition { from: Status, to: Status },

    /// A business rule attached to an otherwise legal transition failed.
    #[error("{0}")]
    GuardViolation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Could not issue a free ticket number for {prefix}-{year} after {attempts} attempts")]
    NumberExhausted {
        prefix: String,
        year: i32,
        attempts: u32,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
