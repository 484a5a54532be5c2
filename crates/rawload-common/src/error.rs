//! Error types shared across rawload crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, RawloadError>;

/// Errors raised by the shared infrastructure (environment, logging, files)
#[derive(Error, Debug)]
pub enum RawloadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration error: {name} is required but not set")]
    MissingVar { name: String },

    #[error("Configuration error: {name}={value:?} is invalid ({reason})")]
    InvalidVar {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl RawloadError {
    pub fn invalid_var(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidVar {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
