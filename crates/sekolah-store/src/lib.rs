//! Sekolah Portal Local Store
//!
//! - Fixed set of named collections holding JSON records keyed by `id`
//! - Create / read / merge-update / idempotent delete / equality filters
//! - Reset to a hardcoded default dataset, applied automatically to an
//!   empty store on first start
//! - A single session slot and a plain credential lookup over `users`
//! - Whole-store export and import
//!
//! Every operation is async and runs its SQLite work on the blocking pool.

mod backup;
mod collection;
mod error;
mod record;
mod records;
mod seed;
mod session;
mod store;

pub use backup::{Backup, IMPORTED_AT_SETTING};
pub use collection::{Collection, KeyPolicy};
pub use error::StoreError;
pub use record::{
    Filter, Record, RecordId, ACTIVE_FIELD, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
pub use seed::{default_dataset, SEEDED_AT_SETTING};
pub use session::SECRET_FIELD;
pub use store::LocalStore;

pub use sekolah_storage::Database;

pub type Result<T> = std::result::Result<T, StoreError>;
