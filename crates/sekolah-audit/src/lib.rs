//! Sekolah Portal Audit Trail
//!
//! Bounded, append-only log of sign-ins, sign-outs, data access and admin
//! actions, kept in the shared database. Newest entries win when the log
//! is trimmed.

mod entry;
mod error;
mod report;
mod trail;

pub use entry::{AuditAction, AuditActor, AuditEntry, AuditFilter};
pub use error::AuditError;
pub use report::{AuditReport, HourBucket, ReportPeriod, UserActivity};
pub use trail::{AuditTrail, DEFAULT_MAX_ENTRIES};

pub type Result<T> = std::result::Result<T, AuditError>;
