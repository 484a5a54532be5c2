//! Ingest error types

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised while downloading, transferring, or loading source files
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Common(#[from] rawload_common::RawloadError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Listing the source failed (network, auth, missing directory); fatal to the run
    #[error("Failed to enumerate {location}: {message}")]
    Enumeration { location: String, message: String },

    /// A single object could not be copied between stores
    #[error("Transfer of {object} failed: {message}")]
    Transfer { object: String, message: String },

    #[error("Dataset download failed: {0}")]
    Dataset(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File columns do not match the destination table
    #[error("Schema mismatch for table {table}: {message}")]
    Schema { table: String, message: String },

    #[error("Invalid table mapping: {0}")]
    Mapping(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IngestError {
    pub fn enumeration(location: impl Into<String>, message: impl ToString) -> Self {
        Self::Enumeration {
            location: location.into(),
            message: message.to_string(),
        }
    }

    pub fn transfer(object: impl Into<String>, message: impl ToString) -> Self {
        Self::Transfer {
            object: object.into(),
            message: message.to_string(),
        }
    }

    /// Configuration problems surface before any I/O and always abort the run
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            IngestError::Config(_)
                | IngestError::Mapping(_)
                | IngestError::Common(rawload_common::RawloadError::Config(_))
                | IngestError::Common(rawload_common::RawloadError::MissingVar { .. })
                | IngestError::Common(rawload_common::RawloadError::InvalidVar { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawload_common::RawloadError;

    #[test]
    fn test_config_errors_are_classified() {
        let missing: IngestError = RawloadError::MissingVar {
            name: "S3_BUCKET".to_string(),
        }
        .into();
        assert!(missing.is_config());
        assert!(missing.to_string().contains("S3_BUCKET"));

        assert!(!IngestError::transfer("raw/a.csv", "timeout").is_config());
    }

    #[test]
    fn test_transfer_message_names_object() {
        let err = IngestError::transfer("raw/olist_orders_dataset.csv", "access denied");
        assert_eq!(
            err.to_string(),
            "Transfer of raw/olist_orders_dataset.csv failed: access denied"
        );
    }
}
