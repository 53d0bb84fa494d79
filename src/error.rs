//! Error types for sheetsync
//!
//! Defines the crate-wide error enum covering every failure mode of the
//! synchronization engine and its adapters. Uses thiserror for ergonomic
//! error handling.

use thiserror::Error;

/// Result type alias for sheetsync operations
pub type Result<T> = std::result::Result<T, SheetSyncError>;

/// Comprehensive error type for sheetsync operations
#[derive(Error, Debug)]
pub enum SheetSyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The sheet could not be read after exhausting all attempts
    #[error("Sheet unavailable after {attempts} attempts: {message}")]
    SourceUnavailable { attempts: u32, message: String },

    /// A mapped payload is missing a required field
    #[error("Validation error: {0}")]
    Validation(String),

    /// CRM create/update call failed
    #[error("CRM API error: {0}")]
    Api(String),

    /// Writing a status cell back to the sheet failed
    #[error("Status write-back failed: {0}")]
    WriteBack(String),

    /// Duplicate search failed for one check field
    #[error("Duplicate lookup failed: {0}")]
    Lookup(String),

    /// Another run holds the single-flight guard
    #[error("Sync already in progress")]
    SyncInProgress,

    /// Integration errors (Google Sheets, Bitrix24)
    #[error("Integration error: {0}")]
    Integration(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unavailable_message() {
        let err = SheetSyncError::SourceUnavailable {
            attempts: 3,
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Sheet unavailable after 3 attempts: connection refused"
        );
    }
}
