use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store '{store}' unavailable: {reason}")]
    StoreUnavailable { store: String, reason: String },

    #[error("Store '{store}' did not synchronize within {timeout_ms}ms")]
    StoreTimeout { store: String, timeout_ms: u64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No store accepted the write")]
    NoStoreAccepted,
}

impl SyncError {
    pub fn unavailable(store: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::StoreUnavailable {
            store: store.into(),
            reason: reason.into(),
        }
    }
}

impl serde::Serialize for SyncError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
