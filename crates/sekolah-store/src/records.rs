//! Record persistence on a single connection
//!
//! Every function here runs inside the caller's transaction.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::collection::Collection;
use crate::error::StoreError;
use crate::record::{Filter, Record, RecordId, ACTIVE_FIELD, ID_FIELD};
use crate::Result;

/// Insert the registry rows for every collection that is not there yet.
pub(crate) fn register_collections(conn: &Connection) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    for collection in Collection::ALL {
        conn.execute(
            "INSERT OR IGNORE INTO collections (name, auto_increment, next_id, created_at)
             VALUES (?1, ?2, 1, ?3)",
            params![
                collection.as_str(),
                collection.is_auto_keyed() as i32,
                now
            ],
        )?;
    }
    Ok(())
}

pub(crate) fn list(
    conn: &Connection,
    collection: Collection,
    filter: Option<&Filter>,
) -> Result<Vec<Record>> {
    let mut stmt =
        conn.prepare("SELECT data FROM records WHERE collection = ?1 ORDER BY seq")?;

    let rows = stmt.query_map([collection.as_str()], |row| row.get::<_, String>(0))?;

    let mut records = Vec::new();
    for row in rows {
        let record: Record = serde_json::from_str(&row?)?;
        if filter.map_or(true, |f| record.matches(f)) {
            records.push(record);
        }
    }
    Ok(records)
}

pub(crate) fn count(conn: &Connection, collection: Collection) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM records WHERE collection = ?1",
        [collection.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub(crate) fn get(
    conn: &Connection,
    collection: Collection,
    id: &RecordId,
) -> Result<Option<Record>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM records WHERE collection = ?1 AND key = ?2",
            params![collection.as_str(), id.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub(crate) fn create(
    conn: &Connection,
    collection: Collection,
    mut record: Record,
) -> Result<Record> {
    let id = match record.id() {
        Some(id) => {
            if collection.is_auto_keyed() {
                if let Some(n) = id.as_i64() {
                    advance_generator(conn, collection, n)?;
                }
            }
            id
        }
        None if record.contains(ID_FIELD) => {
            return Err(StoreError::InvalidRecord(format!(
                "`{}` in {} must be a non-empty string or an integer",
                ID_FIELD, collection
            )));
        }
        None if collection.is_auto_keyed() => {
            let next = next_id(conn, collection)?;
            record.insert(ID_FIELD, next);
            RecordId::from(next)
        }
        None => {
            return Err(StoreError::InvalidRecord(format!(
                "records in {} need an `{}` field",
                collection, ID_FIELD
            )));
        }
    };

    if get(conn, collection, &id)?.is_some() {
        return Err(StoreError::DuplicateKey {
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }

    let now = Utc::now().to_rfc3339();
    record.stamp_created(&now);
    if !record.contains(ACTIVE_FIELD) {
        record.insert(ACTIVE_FIELD, true);
    }

    insert_row(conn, collection, &id, &record)?;
    tracing::debug!(collection = %collection, id = %id, "Created record");

    Ok(record)
}

pub(crate) fn update(
    conn: &Connection,
    collection: Collection,
    id: &RecordId,
    partial: Record,
) -> Result<Record> {
    let mut record = get(conn, collection, id)?.ok_or_else(|| StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    })?;

    record.merge(partial);
    let now = Utc::now().to_rfc3339();
    record.stamp_updated(&now);

    conn.execute(
        "UPDATE records SET data = ?1, updated_at = ?2 WHERE collection = ?3 AND key = ?4",
        params![
            serde_json::to_string(&record)?,
            now,
            collection.as_str(),
            id.as_str()
        ],
    )?;
    tracing::debug!(collection = %collection, id = %id, "Updated record");

    Ok(record)
}

/// Returns whether a row was removed
pub(crate) fn delete(conn: &Connection, collection: Collection, id: &RecordId) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM records WHERE collection = ?1 AND key = ?2",
        params![collection.as_str(), id.as_str()],
    )?;
    if removed == 0 {
        tracing::debug!(collection = %collection, id = %id, "Delete of absent record");
    }
    Ok(removed > 0)
}

/// Remove every record of a collection, returning how many were removed.
/// The identifier generator is left where it is.
pub(crate) fn clear(conn: &Connection, collection: Collection) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM records WHERE collection = ?1",
        [collection.as_str()],
    )?;
    Ok(removed)
}

/// Insert a record exactly as given (timestamps included), used by restore.
pub(crate) fn insert_verbatim(
    conn: &Connection,
    collection: Collection,
    record: &Record,
) -> Result<()> {
    let id = record.id().ok_or_else(|| {
        StoreError::InvalidRecord(format!("record in {} has no usable `{}`", collection, ID_FIELD))
    })?;
    if collection.is_auto_keyed() {
        if let Some(n) = id.as_i64() {
            advance_generator(conn, collection, n)?;
        }
    }
    insert_row(conn, collection, &id, record)
}

fn insert_row(
    conn: &Connection,
    collection: Collection,
    id: &RecordId,
    record: &Record,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let created_at = record
        .created_at()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| now.clone());
    let updated_at = record
        .updated_at()
        .map(|t| t.to_rfc3339())
        .unwrap_or(now);

    conn.execute(
        "INSERT INTO records (collection, key, data, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            collection.as_str(),
            id.as_str(),
            serde_json::to_string(record)?,
            created_at,
            updated_at
        ],
    )?;
    Ok(())
}

fn next_id(conn: &Connection, collection: Collection) -> Result<i64> {
    let next: i64 = conn.query_row(
        "SELECT next_id FROM collections WHERE name = ?1",
        [collection.as_str()],
        |row| row.get(0),
    )?;
    let following = next.checked_add(1).ok_or_else(|| {
        StoreError::InvalidRecord(format!("identifier space exhausted in {}", collection))
    })?;
    conn.execute(
        "UPDATE collections SET next_id = ?1 WHERE name = ?2",
        params![following, collection.as_str()],
    )?;
    Ok(next)
}

/// Make sure the generator never hands out `used` or anything below it.
fn advance_generator(conn: &Connection, collection: Collection, used: i64) -> Result<()> {
    conn.execute(
        "UPDATE collections SET next_id = MAX(next_id, ?1) WHERE name = ?2",
        params![used.saturating_add(1), collection.as_str()],
    )?;
    Ok(())
}
