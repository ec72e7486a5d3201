use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Core service has been shut down")]
    ShutDown,

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

impl CoreError {
    /// Whether the failure is a missing content item, whichever layer saw it
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::Library(core_library::LibraryError::NotFound { .. })
                | CoreError::Sync(core_sync::SyncError::NotFound { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
