//! Error types for opsdesk

use thiserror::Error;

/// Main error type for opsdesk
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Still referenced: {0:?}")]
    InUse(Vec<String>),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorised: {0}")]
    Unauthorised(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded")]
    RateLimited {
        /// Seconds until the caller may retry
        retry_after_secs: u64,
    },

    #[error("Adapter failure: {0}")]
    AdapterFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for opsdesk
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::NotFound(_) => 404,
            Error::InvalidInput(_) => 422,
            Error::InvalidStatus(_) => 422,
            Error::InUse(_) => 409,
            Error::Conflict(_) => 409,
            Error::Unauthorised(_) => 401,
            Error::Forbidden(_) => 403,
            Error::RateLimited { .. } => 429,
            Error::AdapterFailure(_) => 502,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidInput(_) => "VALIDATION_ERROR",
            Error::InvalidStatus(_) => "INVALID_STATUS",
            Error::InUse(_) => "IN_USE",
            Error::Conflict(_) => "CONFLICT",
            Error::Unauthorised(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::AdapterFailure(_) => "ADAPTER_FAILURE",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Retry hint in seconds, if the error carries one
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
