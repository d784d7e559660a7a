//! Audit trail management

use chrono::{DateTime, Duration, Utc};
use rusqlite::Row;
use serde_json::Value;

use crate::entry::{
    format_timestamp, parse_timestamp, AuditAction, AuditActor, AuditEntry, AuditFilter,
};
use crate::report::{AuditReport, ReportPeriod};
use crate::Result;
use sekolah_storage::{Database, StorageError};

pub const DEFAULT_MAX_ENTRIES: usize = 100;

const SELECT_ENTRIES: &str =
    "SELECT id, timestamp, action, description, user_id, user_name, user_role, metadata
     FROM audit_log ORDER BY timestamp DESC, seq DESC";

pub struct AuditTrail {
    db: Database,
    max_entries: usize,
}

impl AuditTrail {
    pub fn new(db: Database, max_entries: usize) -> Self {
        Self {
            db,
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Record an action and trim the log to the last `max_entries` recorded
    pub fn log(
        &self,
        action: AuditAction,
        description: &str,
        actor: AuditActor,
        metadata: Option<Value>,
    ) -> Result<AuditEntry> {
        let mut entry = AuditEntry::new(action, description, actor);
        entry.metadata = metadata;
        self.append(&entry)?;
        Ok(entry)
    }

    /// Store a fully built entry, keeping its id and timestamp. Trimming
    /// drops the earliest inserted entries, whatever their timestamps.
    pub fn append(&self, entry: &AuditEntry) -> Result<()> {
        let metadata = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let timestamp = format_timestamp(&entry.timestamp);
        let max_entries = self.max_entries as i64;

        let trimmed = self.db.transaction(|conn| {
            conn.execute(
                "INSERT INTO audit_log
                 (id, timestamp, action, description, user_id, user_name, user_role, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    entry.id,
                    timestamp,
                    entry.action.as_str(),
                    entry.description,
                    entry.actor.id,
                    entry.actor.name,
                    entry.actor.role,
                    metadata,
                ],
            )?;

            let trimmed = conn.execute(
                "DELETE FROM audit_log WHERE seq NOT IN (
                     SELECT seq FROM audit_log ORDER BY seq DESC LIMIT ?1
                 )",
                [max_entries],
            )?;

            Ok::<_, StorageError>(trimmed)
        })?;

        tracing::debug!(
            action = %entry.action,
            user = %entry.actor.id,
            trimmed,
            "Audit entry recorded"
        );

        Ok(())
    }

    /// Matching entries, newest first
    pub fn entries(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let entries = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(SELECT_ENTRIES)?;
            let rows = stmt.query_map([], read_row)?;

            let mut entries = Vec::new();
            for row in rows {
                match row? {
                    Some(entry) => entries.push(entry),
                    None => tracing::warn!("Skipping unreadable audit entry"),
                }
            }
            Ok(entries)
        })?;

        Ok(entries
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.db.with_connection(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
            Ok(count as usize)
        })?)
    }

    /// Summary of activity over the period ending now
    pub fn report(&self, period: ReportPeriod) -> Result<AuditReport> {
        self.report_at(period, Utc::now())
    }

    /// Summary of activity over the period ending at `now`
    pub fn report_at(&self, period: ReportPeriod, now: DateTime<Utc>) -> Result<AuditReport> {
        let since = period.start_from(now);
        let entries = self.entries(&AuditFilter::new().since(since).until(now))?;
        Ok(AuditReport::build(period, since, now, &entries))
    }

    /// Delete entries older than `days` days. Returns the number remaining.
    pub fn prune_older_than(&self, days: u32) -> Result<usize> {
        self.prune_before(Utc::now() - Duration::days(i64::from(days)))
    }

    /// Delete entries stamped at or before `cutoff`. Returns the number remaining.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = format_timestamp(&cutoff);

        let (removed, remaining) = self.db.transaction(|conn| {
            let removed = conn.execute("DELETE FROM audit_log WHERE timestamp <= ?1", [&cutoff])?;
            let remaining: i64 =
                conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
            Ok::<_, StorageError>((removed, remaining as usize))
        })?;

        tracing::info!(removed, remaining, cutoff = %cutoff, "Pruned audit log");

        Ok(remaining)
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<()> {
        Ok(self.db.with_connection(|conn| {
            conn.execute("DELETE FROM audit_log", [])?;
            Ok(())
        })?)
    }

    /// Whole log as CSV, newest first
    pub fn export_csv(&self) -> Result<String> {
        let entries = self.entries(&AuditFilter::new())?;

        let mut csv = String::from("Timestamp,Action,Description,User Name,User Role\n");
        for entry in &entries {
            let row = [
                csv_field(&format_timestamp(&entry.timestamp)),
                entry.action.as_str().to_string(),
                quote(&entry.description),
                csv_field(&entry.actor.name),
                csv_field(&entry.actor.role),
            ];
            csv.push_str(&row.join(","));
            csv.push('\n');
        }

        Ok(csv)
    }
}

impl Clone for AuditTrail {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            max_entries: self.max_entries,
        }
    }
}

/// `None` when a stored value no longer parses
fn read_row(row: &Row<'_>) -> rusqlite::Result<Option<AuditEntry>> {
    let timestamp: String = row.get(1)?;
    let action: String = row.get(2)?;
    let metadata: Option<String> = row.get(7)?;

    let (Some(timestamp), Ok(action)) =
        (parse_timestamp(&timestamp), action.parse::<AuditAction>())
    else {
        return Ok(None);
    };
    let metadata = match metadata {
        Some(text) => match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(_) => return Ok(None),
        },
        None => None,
    };

    Ok(Some(AuditEntry {
        id: row.get(0)?,
        timestamp,
        action,
        description: row.get(3)?,
        actor: AuditActor {
            id: row.get(4)?,
            name: row.get(5)?,
            role: row.get(6)?,
        },
        metadata,
    }))
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Quote only when the value would break the row
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        quote(value)
    } else {
        value.to_string()
    }
}
