use bridge_traits::{BridgeError, ContentKind};
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid content kind: {0}")]
    InvalidKind(String),

    #[error("Sync already in progress for {kind}")]
    SyncInProgress { kind: ContentKind },

    #[error("Download already in progress for {document_id}")]
    DownloadInProgress { document_id: String },

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether another attempt may succeed without intervention
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::RemoteUnavailable(_) | SyncError::Storage(_))
    }

    pub(crate) fn content_not_found(document_id: &str) -> Self {
        SyncError::NotFound {
            entity_type: "ContentItem".to_string(),
            id: document_id.to_string(),
        }
    }
}

impl From<LibraryError> for SyncError {
    fn from(error: LibraryError) -> Self {
        match error {
            LibraryError::NotFound { entity_type, id } => SyncError::NotFound { entity_type, id },
            LibraryError::InvalidKind(kind) => SyncError::InvalidKind(kind),
            other => SyncError::Storage(other.to_string()),
        }
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        SyncError::RemoteUnavailable(error.to_string())
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(error: sqlx::Error) -> Self {
        SyncError::Storage(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
