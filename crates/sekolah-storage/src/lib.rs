//! Sekolah Portal Storage Medium
//!
//! SQLite-backed persistence shared by the record store and the audit trail.
//! One connection per process, guarded by a mutex; callers hold it for a
//! single statement or a single transaction.

mod database;
mod error;
mod migrations;

pub use database::Database;
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
