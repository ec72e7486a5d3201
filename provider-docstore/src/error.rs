//! Error types for the document store provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Document store provider errors
#[derive(Error, Debug)]
pub enum DocStoreError {
    /// API request returned a non-retryable error status
    #[error("Document store API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Retryable status persisted through every attempt
    #[error("Document store unavailable after {attempts} attempts (status {status_code})")]
    RetriesExhausted { status_code: u16, attempts: u32 },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Pagination returned a token it had already returned
    #[error("Pagination did not advance in collection {collection}")]
    PaginationStalled { collection: String },

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for document store operations
pub type Result<T> = std::result::Result<T, DocStoreError>;

impl From<DocStoreError> for BridgeError {
    fn from(error: DocStoreError) -> Self {
        match error {
            DocStoreError::RetriesExhausted { .. } => BridgeError::NotAvailable(error.to_string()),
            DocStoreError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DocStoreError::ApiError {
            status_code: 403,
            message: "permission denied".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Document store API error (status 403): permission denied"
        );
    }

    #[test]
    fn test_error_conversion() {
        let exhausted: BridgeError = DocStoreError::RetriesExhausted {
            status_code: 503,
            attempts: 3,
        }
        .into();
        assert!(matches!(exhausted, BridgeError::NotAvailable(_)));

        let parse: BridgeError = DocStoreError::ParseError("eof".to_string()).into();
        assert!(matches!(parse, BridgeError::OperationFailed(_)));
    }
}
