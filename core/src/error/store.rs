use thiserror::Error;

/// Durable store failures. Callers on the execution path log and swallow these.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("row already exists: {0}")]
    UniqueViolation(String),

    #[error("row not found: {0}")]
    NotFound(String),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}
