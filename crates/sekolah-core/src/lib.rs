//! Sekolah Portal Core
//!
//! Configuration, logging setup and the [`Portal`] facade that ties the
//! local store to the audit trail.

mod config;
mod error;
mod portal;

pub use config::Config;
pub use error::CoreError;
pub use portal::Portal;

// Re-export the building blocks
pub use sekolah_audit::{
    AuditAction, AuditActor, AuditEntry, AuditError, AuditFilter, AuditReport, AuditTrail,
    ReportPeriod,
};
pub use sekolah_storage::{Database, StorageError};
pub use sekolah_store::{Backup, Collection, Filter, LocalStore, Record, RecordId, StoreError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A subscriber may already be installed by the embedding application
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
