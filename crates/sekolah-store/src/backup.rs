//! Export and import of the whole store
//!
//! Document shape: `{ "<collection>": [ {record}, ... ], ... }`

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::collection::Collection;
use crate::error::StoreError;
use crate::record::{Record, CREATED_AT_FIELD, UPDATED_AT_FIELD};
use crate::store::{blocking, LocalStore};
use crate::{records, Result};

/// Setting key holding the time of the last import
pub const IMPORTED_AT_SETTING: &str = "imported_at";

/// Collection name -> full record list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Backup(BTreeMap<String, Vec<Record>>);

impl Backup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: Collection, records: Vec<Record>) {
        self.0.insert(collection.as_str().to_string(), records);
    }

    pub fn records(&self, collection: &str) -> Option<&[Record]> {
        self.0.get(collection).map(Vec::as_slice)
    }

    pub fn collections(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.0.iter().map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    /// Total number of records across all collections
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a serialized document. Shape errors are reported as
    /// `ImportMalformed`; contents are checked by `validate`.
    pub fn from_json(document: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(document)
            .map_err(|e| StoreError::ImportMalformed(format!("not valid JSON: {}", e)))?;

        let Value::Object(map) = value else {
            return Err(StoreError::ImportMalformed(
                "top level must be an object of collections".to_string(),
            ));
        };

        let mut backup = Backup::new();
        for (name, entries) in map {
            let Value::Array(entries) = entries else {
                return Err(StoreError::ImportMalformed(format!(
                    "`{}` must be an array of records",
                    name
                )));
            };

            let records = entries
                .into_iter()
                .enumerate()
                .map(|(index, entry)| {
                    Record::from_value(entry).map_err(|_| {
                        StoreError::ImportMalformed(format!(
                            "`{}`[{}] is not an object",
                            name, index
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            backup.0.insert(name, records);
        }

        Ok(backup)
    }

    /// Check names and identifiers, and fill in missing timestamps.
    fn validate(self) -> Result<Vec<(Collection, Vec<Record>)>> {
        let now = Utc::now().to_rfc3339();
        let mut prepared = Vec::with_capacity(self.0.len());

        for (name, records) in self.0 {
            let collection: Collection = name
                .parse()
                .map_err(|_| {
                    StoreError::ImportMalformed(format!("unknown collection `{}`", name))
                })?;

            let mut seen = HashSet::new();
            let mut checked = Vec::with_capacity(records.len());
            for (index, mut record) in records.into_iter().enumerate() {
                let id = record.id().ok_or_else(|| {
                    StoreError::ImportMalformed(format!(
                        "`{}`[{}] has no usable `id`",
                        name, index
                    ))
                })?;
                if !seen.insert(id.clone()) {
                    return Err(StoreError::ImportMalformed(format!(
                        "`{}` contains `{}` more than once",
                        name, id
                    )));
                }

                if !record.contains(CREATED_AT_FIELD) {
                    record.insert(CREATED_AT_FIELD, now.as_str());
                }
                if !record.contains(UPDATED_AT_FIELD) {
                    let created = record
                        .get(CREATED_AT_FIELD)
                        .cloned()
                        .unwrap_or_else(|| Value::from(now.as_str()));
                    record.insert(UPDATED_AT_FIELD, created);
                }
                checked.push(record);
            }

            prepared.push((collection, checked));
        }

        Ok(prepared)
    }
}

impl LocalStore {
    /// Snapshot of every collection, read in one transaction
    pub async fn export_all(&self) -> Result<Backup> {
        let backup = self
            .run(|conn| {
                let mut backup = Backup::new();
                for collection in Collection::ALL {
                    backup.insert(collection, records::list(conn, collection, None)?);
                }
                Ok(backup)
            })
            .await?;

        tracing::info!(records = backup.len(), "Exported store");

        Ok(backup)
    }

    /// Parse a serialized document and restore it. See [`LocalStore::restore`].
    pub async fn import_all(&self, document: &str) -> Result<usize> {
        let backup = Backup::from_json(document)?;
        self.restore(backup).await
    }

    /// Replace the contents of every collection named in `backup`.
    ///
    /// The document is validated as a whole before anything is written.
    /// Each collection is then replaced in its own transaction; collections
    /// missing from the document keep their records. Returns the number of
    /// records written.
    pub async fn restore(&self, backup: Backup) -> Result<usize> {
        let prepared = backup.validate()?;
        let db = self.database().await?;

        blocking(move || {
            let mut written = 0usize;
            for (collection, entries) in prepared {
                let count = entries.len();
                db.transaction(|conn| {
                    records::clear(conn, collection)?;
                    for record in &entries {
                        records::insert_verbatim(conn, collection, record)?;
                    }
                    Ok::<_, StoreError>(())
                })?;
                tracing::debug!(collection = %collection, records = count, "Restored collection");
                written += count;
            }

            db.set_setting(IMPORTED_AT_SETTING, &Utc::now().to_rfc3339())?;
            tracing::info!(records = written, "Imported store");

            Ok(written)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Filter;
    use serde_json::json;

    fn empty_store() -> LocalStore {
        LocalStore::in_memory().with_default_seed(false)
    }

    #[tokio::test]
    async fn test_export_then_import_reproduces_content() {
        let source = LocalStore::in_memory();
        source.initialize().await.unwrap();
        source
            .create_item("comments", Record::new().with("text", "Keren sekali"))
            .await
            .unwrap();
        source
            .update_item("works", "work-2", Record::new().with("likes", 5))
            .await
            .unwrap();

        let exported = source.export_all().await.unwrap();
        let document = exported.to_json().unwrap();

        let target = empty_store();
        let written = target.import_all(&document).await.unwrap();
        assert_eq!(written, exported.len());

        let round_trip = target.export_all().await.unwrap();
        assert_eq!(round_trip, exported);

        // Auto-keyed generator continues after imported ids
        let next = target
            .create_item("comments", Record::new().with("text", "Lagi"))
            .await
            .unwrap();
        assert_eq!(next.get("id"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_export_lists_every_collection() {
        let store = empty_store();
        let exported = store.export_all().await.unwrap();
        assert_eq!(exported.collections().count(), Collection::ALL.len());
        assert!(exported.is_empty());
    }

    #[tokio::test]
    async fn test_import_replaces_only_named_collections() {
        let store = LocalStore::in_memory();
        store.initialize().await.unwrap();

        let document = json!({
            "news": [{"id": "n9", "title": "Satu-satunya berita"}]
        })
        .to_string();
        store.import_all(&document).await.unwrap();

        let news = store.list_items("news", None).await.unwrap();
        assert_eq!(news.len(), 1);
        assert!(news[0].created_at().is_some());
        assert_eq!(news[0].created_at(), news[0].updated_at());

        // Untouched collections keep the seed data
        assert_eq!(store.count_items("carousel").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_import_keeps_record_fields_verbatim() {
        let store = empty_store();
        let document = json!({
            "carousel": [{
                "id": "s1",
                "active": false,
                "createdAt": "2023-05-01T08:00:00+00:00",
                "updatedAt": "2023-06-01T08:00:00+00:00"
            }]
        })
        .to_string();
        store.import_all(&document).await.unwrap();

        let slide = store.get_item("carousel", "s1").await.unwrap();
        assert_eq!(slide.get_str("createdAt"), Some("2023-05-01T08:00:00+00:00"));
        assert_eq!(slide.get_str("updatedAt"), Some("2023-06-01T08:00:00+00:00"));
        assert!(store
            .list_items("carousel", Some(&Filter::new().with("active", true)))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_import_keeps_foreign_timestamps() {
        let store = empty_store();
        let document = json!({
            "news": [{"id": "n1", "createdAt": 1700000000000i64}]
        })
        .to_string();
        store.import_all(&document).await.unwrap();

        let news = store.get_item("news", "n1").await.unwrap();
        assert_eq!(news.get("createdAt"), Some(&json!(1700000000000i64)));
        assert_eq!(news.get("updatedAt"), Some(&json!(1700000000000i64)));
    }

    #[tokio::test]
    async fn test_import_of_largest_comment_id() {
        let store = empty_store();
        let document = json!({"comments": [{"id": i64::MAX, "text": "terakhir"}]}).to_string();
        store.import_all(&document).await.unwrap();

        let err = store
            .create_item("comments", Record::new().with("text", "lagi"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
        assert_eq!(store.count_items("comments").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_documents_are_rejected() {
        let store = LocalStore::in_memory();
        store.initialize().await.unwrap();
        let before = store.export_all().await.unwrap();

        let cases = [
            "not json".to_string(),
            json!([1, 2, 3]).to_string(),
            json!({"news": {"id": "n1"}}).to_string(),
            json!({"news": [42]}).to_string(),
            json!({"gallery": []}).to_string(),
            json!({"news": [{"title": "tanpa id"}]}).to_string(),
            json!({"news": [], "works": [{"id": "w"}, {"id": "w"}]}).to_string(),
        ];

        for document in &cases {
            let err = store.import_all(document).await.unwrap_err();
            assert!(
                matches!(err, StoreError::ImportMalformed(_)),
                "expected ImportMalformed for {document}, got {err:?}"
            );
        }

        assert_eq!(store.export_all().await.unwrap(), before);
    }
}
