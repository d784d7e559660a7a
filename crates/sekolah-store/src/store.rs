//! Local Store
//!
//! Async handle over the collection database. Construct one per process
//! and clone it into every consumer; clones share the same connection and
//! the same initialization state.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

use sekolah_storage::Database;

use crate::collection::Collection;
use crate::error::StoreError;
use crate::record::{Filter, Record, RecordId};
use crate::{records, seed, Result};

#[derive(Debug, Clone)]
enum Medium {
    File(PathBuf),
    Memory,
}

impl Medium {
    fn open(&self) -> sekolah_storage::Result<Database> {
        match self {
            Medium::File(path) => Database::open(path),
            Medium::Memory => Database::open_in_memory(),
        }
    }
}

impl std::fmt::Display for Medium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Medium::File(path) => write!(f, "{}", path.display()),
            Medium::Memory => write!(f, ":memory:"),
        }
    }
}

pub struct LocalStore {
    /// Where the database lives
    medium: Medium,
    /// Seed the default dataset when initialization finds an empty store
    seed_defaults: bool,
    /// Opened lazily, exactly once
    db: Arc<OnceCell<Database>>,
    /// Number of completed schema passes
    schema_passes: Arc<AtomicUsize>,
}

impl LocalStore {
    /// Store backed by a database file (created on first initialization)
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self::with_medium(Medium::File(path.as_ref().to_path_buf()))
    }

    /// Store backed by a private in-memory database
    pub fn in_memory() -> Self {
        Self::with_medium(Medium::Memory)
    }

    fn with_medium(medium: Medium) -> Self {
        Self {
            medium,
            seed_defaults: true,
            db: Arc::new(OnceCell::new()),
            schema_passes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enable or disable seeding of the default dataset on an empty store.
    /// Only affects initialization that has not happened yet.
    pub fn with_default_seed(mut self, enabled: bool) -> Self {
        self.seed_defaults = enabled;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.db.initialized()
    }

    /// How many initialization passes completed. Stays at 1 once initialized.
    pub fn schema_passes(&self) -> usize {
        self.schema_passes.load(Ordering::SeqCst)
    }

    /// Open the medium, establish the collections and seed an empty store.
    ///
    /// Idempotent. Callers arriving while the first initialization is in
    /// flight wait for its outcome. A failed attempt leaves the store
    /// uninitialized so a later call can retry. A reset cut short (here or
    /// by `reset_to_defaults`) leaves partial data behind; the next
    /// initialization runs it again from the start.
    pub async fn initialize(&self) -> Result<()> {
        self.database().await.map(|_| ())
    }

    /// Shared database handle, initializing first if needed
    pub async fn database(&self) -> Result<Database> {
        let db = self
            .db
            .get_or_try_init(|| {
                let medium = self.medium.clone();
                let seed_defaults = self.seed_defaults;
                let passes = Arc::clone(&self.schema_passes);
                blocking(move || prepare(&medium, seed_defaults, &passes))
            })
            .await?;
        Ok(db.clone())
    }

    /// Run `f` on the blocking pool inside one transaction
    pub(crate) async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.database().await?;
        blocking(move || db.transaction(f)).await
    }

    /// All records of a collection in storage order, optionally narrowed
    /// to those whose fields equal every filter entry.
    pub async fn list_items(
        &self,
        collection: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<Record>> {
        let collection: Collection = collection.parse()?;
        let filter = filter.cloned();
        self.run(move |conn| records::list(conn, collection, filter.as_ref()))
            .await
    }

    pub async fn get_item(&self, collection: &str, id: impl Into<RecordId>) -> Result<Record> {
        let collection: Collection = collection.parse()?;
        let id = id.into();
        self.run(move |conn| {
            records::get(conn, collection, &id)?.ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
        })
        .await
    }

    pub async fn count_items(&self, collection: &str) -> Result<usize> {
        let collection: Collection = collection.parse()?;
        self.run(move |conn| records::count(conn, collection)).await
    }

    /// Store a new record and return it as persisted (with `id`,
    /// timestamps and the `active` default filled in).
    pub async fn create_item(&self, collection: &str, record: Record) -> Result<Record> {
        let collection: Collection = collection.parse()?;
        let record = self
            .run(move |conn| records::create(conn, collection, record))
            .await?;

        tracing::info!(
            collection = %collection,
            id = %record.id().map(|id| id.to_string()).unwrap_or_default(),
            "Created record"
        );

        Ok(record)
    }

    /// Merge `partial` onto an existing record and return the result
    pub async fn update_item(
        &self,
        collection: &str,
        id: impl Into<RecordId>,
        partial: Record,
    ) -> Result<Record> {
        let collection: Collection = collection.parse()?;
        let id = id.into();
        self.run(move |conn| records::update(conn, collection, &id, partial))
            .await
    }

    /// Remove a record. Deleting an absent identifier succeeds; the return
    /// value tells whether anything was removed.
    pub async fn delete_item(&self, collection: &str, id: impl Into<RecordId>) -> Result<bool> {
        let collection: Collection = collection.parse()?;
        let id = id.into();
        let log_id = id.clone();
        let removed = self
            .run(move |conn| records::delete(conn, collection, &id))
            .await?;

        if removed {
            tracing::info!(collection = %collection, id = %log_id, "Deleted record");
        }

        Ok(removed)
    }

    pub async fn clear_collection(&self, collection: &str) -> Result<usize> {
        let collection: Collection = collection.parse()?;
        let removed = self
            .run(move |conn| records::clear(conn, collection))
            .await?;

        tracing::info!(collection = %collection, removed, "Cleared collection");

        Ok(removed)
    }

    /// True when no collection holds any record
    pub async fn is_empty(&self) -> Result<bool> {
        self.run(|conn| store_is_empty(conn)).await
    }

    /// Clear every collection and repopulate the default dataset.
    ///
    /// Each clear and each insert commits on its own; an interrupted reset
    /// leaves the store partially reset.
    pub async fn reset_to_defaults(&self) -> Result<()> {
        let db = self.database().await?;
        blocking(move || seed::reset(&db)).await
    }
}

impl Clone for LocalStore {
    fn clone(&self) -> Self {
        Self {
            medium: self.medium.clone(),
            seed_defaults: self.seed_defaults,
            db: Arc::clone(&self.db),
            schema_passes: Arc::clone(&self.schema_passes),
        }
    }
}

pub(crate) async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

fn prepare(medium: &Medium, seed_defaults: bool, passes: &AtomicUsize) -> Result<Database> {
    let db = medium.open().map_err(|e| {
        tracing::error!(medium = %medium, error = %e, "Failed to open store");
        StoreError::StorageUnavailable(format!("{}: {}", medium, e))
    })?;

    if !db.is_healthy() {
        tracing::error!(medium = %medium, "Store does not answer queries");
        return Err(StoreError::StorageUnavailable(format!(
            "{}: database not responding",
            medium
        )));
    }

    db.transaction(records::register_collections)?;

    if db.get_setting(seed::SEED_PENDING_SETTING)?.is_some() {
        tracing::warn!("Previous reset did not complete, seeding default dataset again");
        seed::reset(&db)?;
    } else if seed_defaults && db.transaction(store_is_empty)? {
        tracing::info!("Store is empty, seeding default dataset");
        seed::reset(&db)?;
    }

    passes.fetch_add(1, Ordering::SeqCst);

    tracing::info!(medium = %medium, "Store initialized");

    Ok(db)
}

fn store_is_empty(conn: &Connection) -> Result<bool> {
    for collection in Collection::ALL {
        if records::count(conn, collection)? > 0 {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_store() -> LocalStore {
        LocalStore::in_memory().with_default_seed(false)
    }

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let store = empty_store();
        let input = record(json!({"id": "w1", "title": "Lukisan Sawah", "author": "Siti"}));

        store.create_item("works", input.clone()).await.unwrap();

        let items = store.list_items("works", None).await.unwrap();
        assert_eq!(items.len(), 1);

        let stored = &items[0];
        assert!(stored.created_at().is_some());
        assert_eq!(stored.created_at(), stored.updated_at());
        assert_eq!(stored.get("active"), Some(&json!(true)));

        let mut expected = input;
        expected.insert("active", true);
        assert_eq!(stored.without_timestamps(), expected);
    }

    #[tokio::test]
    async fn test_create_keeps_explicit_active_flag() {
        let store = empty_store();
        let created = store
            .create_item("carousel", record(json!({"id": "s1", "active": false})))
            .await
            .unwrap();
        assert!(!created.is_active());
    }

    #[tokio::test]
    async fn test_store_overwrites_caller_timestamps() {
        let store = empty_store();
        let created = store
            .create_item(
                "news",
                record(json!({"id": "n1", "createdAt": "1999-01-01T00:00:00+00:00"})),
            )
            .await
            .unwrap();
        assert_ne!(created.get_str("createdAt"), Some("1999-01-01T00:00:00+00:00"));
    }

    #[tokio::test]
    async fn test_duplicate_key() {
        let store = empty_store();
        store
            .create_item("users", record(json!({"id": "u1"})))
            .await
            .unwrap();

        let err = store
            .create_item("users", record(json!({"id": "u1", "name": "Lain"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref collection, ref id }
            if collection == "users" && id == "u1"));

        assert_eq!(store.count_items("users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_caller_keyed_requires_id() {
        let store = empty_store();
        let err = store
            .create_item("news", record(json!({"title": "Tanpa id"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn test_comments_are_auto_keyed() {
        let store = empty_store();
        let mut ids = Vec::new();
        for text in ["Bagus", "Keren", "Mantap"] {
            let created = store
                .create_item("comments", record(json!({"text": text})))
                .await
                .unwrap();
            ids.push(created.get("id").cloned().unwrap());
        }
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);

        let second = store.get_item("comments", 2).await.unwrap();
        assert_eq!(second.get_str("text"), Some("Keren"));
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let store = empty_store();
        let err = store.list_items("gallery", None).await.unwrap_err();
        assert!(matches!(err, StoreError::CollectionNotFound(ref name) if name == "gallery"));

        let err = store
            .create_item("gallery", Record::new().with("id", "g1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_filter_preserves_storage_order() {
        let store = empty_store();
        for (id, active) in [("c", true), ("a", false), ("b", true), ("d", true)] {
            store
                .create_item("carousel", record(json!({"id": id, "active": active})))
                .await
                .unwrap();
        }

        let filter = Filter::new().with("active", true);
        let ids: Vec<String> = store
            .list_items("carousel", Some(&filter))
            .await
            .unwrap()
            .iter()
            .filter_map(|r| r.get_str("id").map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["c", "b", "d"]);
    }

    #[tokio::test]
    async fn test_update_merges() {
        let store = empty_store();
        let created = store
            .create_item(
                "news",
                record(json!({"id": "n1", "title": "Lama", "body": "Isi berita", "views": 3})),
            )
            .await
            .unwrap();

        let updated = store
            .update_item("news", "n1", Record::new().with("title", "Baru"))
            .await
            .unwrap();

        assert_eq!(updated.get_str("title"), Some("Baru"));
        assert_eq!(updated.get_str("body"), Some("Isi berita"));
        assert_eq!(updated.get("views"), Some(&json!(3)));
        assert_eq!(updated.get_str("createdAt"), created.get_str("createdAt"));
        assert!(updated.updated_at() >= created.updated_at());

        // Only title and updatedAt differ
        let mut before = created.clone();
        before.remove("updatedAt");
        let mut after = updated.clone();
        after.remove("updatedAt");
        after.insert("title", "Lama");
        assert_eq!(before, after);

        let stored = store.get_item("news", "n1").await.unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = empty_store();
        let err = store
            .update_item("news", "nope", Record::new().with("title", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_keeps_position() {
        let store = empty_store();
        for id in ["a", "b", "c"] {
            store
                .create_item("works", Record::new().with("id", id))
                .await
                .unwrap();
        }
        store
            .update_item("works", "a", Record::new().with("title", "Ubah"))
            .await
            .unwrap();

        let ids: Vec<_> = store
            .list_items("works", None)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.id())
            .collect();
        assert_eq!(ids, vec![RecordId::from("a"), "b".into(), "c".into()]);
    }

    #[tokio::test]
    async fn test_recreate_moves_to_end() {
        let store = empty_store();
        for id in ["a", "b", "c"] {
            store
                .create_item("works", Record::new().with("id", id))
                .await
                .unwrap();
        }
        assert!(store.delete_item("works", "a").await.unwrap());
        store
            .create_item("works", Record::new().with("id", "a"))
            .await
            .unwrap();

        let ids: Vec<_> = store
            .list_items("works", None)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.id())
            .collect();
        assert_eq!(ids, vec![RecordId::from("b"), "c".into(), "a".into()]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = empty_store();
        store
            .create_item("works", Record::new().with("id", "w1"))
            .await
            .unwrap();

        assert!(store.delete_item("works", "w1").await.unwrap());
        assert!(!store.delete_item("works", "w1").await.unwrap());
        assert!(!store.delete_item("works", "never-existed").await.unwrap());

        let items = store.list_items("works", None).await.unwrap();
        assert!(items.iter().all(|r| r.get_str("id") != Some("w1")));

        let err = store.get_item("works", "w1").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_clear_collection_and_is_empty() {
        let store = empty_store();
        assert!(store.is_empty().await.unwrap());

        store
            .create_item("materi", Record::new().with("id", "m1"))
            .await
            .unwrap();
        assert!(!store.is_empty().await.unwrap());

        assert_eq!(store.clear_collection("materi").await.unwrap(), 1);
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_initialize_runs_once() {
        let store = LocalStore::in_memory();
        let other = store.clone();

        let (a, b, c) = tokio::join!(store.initialize(), other.initialize(), store.initialize());
        a.unwrap();
        b.unwrap();
        c.unwrap();
        store.initialize().await.unwrap();

        assert!(store.is_initialized());
        assert_eq!(store.schema_passes(), 1);

        let users = store.list_items("users", None).await.unwrap();
        assert_eq!(users.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initialize_on_multi_thread_runtime() {
        let store = LocalStore::in_memory();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.initialize().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.schema_passes(), 1);
        assert_eq!(store.count_items("users").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_operations_initialize_lazily() {
        let store = empty_store();
        assert!(!store.is_initialized());
        assert!(store.list_items("news", None).await.unwrap().is_empty());
        assert!(store.is_initialized());
    }

    #[tokio::test]
    async fn test_unavailable_medium() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file, not a directory").unwrap();

        let store = LocalStore::open(blocker.join("portal.db"));
        let err = store.initialize().await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
        assert!(!store.is_initialized());

        // Every operation reports the same failure until the medium is fixed
        let err = store.list_items("news", None).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));

        std::fs::remove_file(&blocker).unwrap();
        store.initialize().await.unwrap();
        assert_eq!(store.schema_passes(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_reset_runs_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal.db");

        // A reset that stopped after one record
        let db = Database::open(&path).unwrap();
        db.transaction(records::register_collections).unwrap();
        db.transaction(|conn| {
            records::create(conn, Collection::Carousel, Record::new().with("id", "slide-1"))
        })
        .unwrap();
        db.set_setting(seed::SEED_PENDING_SETTING, "2024-01-01T00:00:00Z")
            .unwrap();
        drop(db);

        let store = LocalStore::open(&path);
        store.initialize().await.unwrap();
        assert_eq!(store.schema_passes(), 1);
        assert_eq!(store.count_items("carousel").await.unwrap(), 4);
        assert_eq!(store.count_items("users").await.unwrap(), 3);

        let db = store.database().await.unwrap();
        assert!(db.get_setting(seed::SEED_PENDING_SETTING).unwrap().is_none());
        assert!(db.get_setting(seed::SEEDED_AT_SETTING).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal.db");

        {
            let store = LocalStore::open(&path).with_default_seed(false);
            store
                .create_item("news", Record::new().with("id", "n1").with("title", "Pengumuman"))
                .await
                .unwrap();
        }

        let reopened = LocalStore::open(&path);
        let news = reopened.list_items("news", None).await.unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].get_str("title"), Some("Pengumuman"));
        // Not empty on startup, so no default users were seeded
        assert_eq!(reopened.count_items("users").await.unwrap(), 0);
    }
}
