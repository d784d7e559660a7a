//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Store error: {0}")]
    Store(#[from] sekolah_store::StoreError),

    #[error("Audit error: {0}")]
    Audit(#[from] sekolah_audit::AuditError),

    #[error("Storage error: {0}")]
    Storage(#[from] sekolah_storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}
