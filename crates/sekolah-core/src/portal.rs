//! Portal facade
//!
//! Owns the local store and the audit trail, and records sign-ins,
//! sign-outs and admin changes as they happen. Both share one database.

use chrono::Utc;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use sekolah_audit::{
    AuditAction, AuditActor, AuditEntry, AuditFilter, AuditReport, AuditTrail, ReportPeriod,
};
use sekolah_store::{LocalStore, Record, RecordId};

use crate::config::Config;
use crate::error::CoreError;
use crate::Result;

pub struct Portal {
    config: Config,
    store: LocalStore,
    audit: AuditTrail,
}

impl Portal {
    /// Open the store described by `config`, seeding it if it starts empty
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store =
            LocalStore::open(&config.database_path).with_default_seed(config.seed_defaults);
        Self::with_store(config, store).await
    }

    /// Build around an existing store handle
    pub async fn with_store(config: Config, store: LocalStore) -> Result<Self> {
        store.initialize().await?;
        let audit = AuditTrail::new(store.database().await?, config.audit_max_entries);

        tracing::info!(
            database = %config.database_path.display(),
            audit_max_entries = config.audit_max_entries,
            "Portal ready"
        );

        Ok(Self {
            config,
            store,
            audit,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Sign in by username or email. A successful sign-in is audited.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Option<Record>> {
        let user = self.store.authenticate(identifier, secret).await?;

        if let Some(user) = &user {
            let actor = AuditActor::from_user(Some(user.as_map()));
            let description = format!("{} signed in", actor.name);
            self.record(AuditAction::Login, description, actor, None)
                .await?;
        }

        Ok(user)
    }

    /// Clear the session, auditing the sign-out of whoever held it
    pub async fn logout(&self) -> Result<Option<Record>> {
        let previous = self.store.logout().await?;

        if let Some(user) = &previous {
            let actor = AuditActor::from_user(Some(user.as_map()));
            let description = format!("{} signed out", actor.name);
            self.record(AuditAction::Logout, description, actor, None)
                .await?;
        }

        Ok(previous)
    }

    pub async fn current_user(&self) -> Result<Option<Record>> {
        Ok(self.store.get_current_user().await?)
    }

    pub async fn create_item(&self, collection: &str, record: Record) -> Result<Record> {
        let created = self.store.create_item(collection, record).await?;
        let id = created.id().map(|id| id.to_string()).unwrap_or_default();

        self.admin_action(
            format!("Created {}/{}", collection, id),
            json!({"operation": "create", "collection": collection, "id": id}),
        )
        .await?;

        Ok(created)
    }

    pub async fn update_item(
        &self,
        collection: &str,
        id: impl Into<RecordId>,
        partial: Record,
    ) -> Result<Record> {
        let id = id.into();
        let fields: Vec<String> = partial.as_map().keys().cloned().collect();
        let updated = self
            .store
            .update_item(collection, id.clone(), partial)
            .await?;

        self.admin_action(
            format!("Updated {}/{}", collection, id),
            json!({
                "operation": "update",
                "collection": collection,
                "id": id.as_str(),
                "fields": fields,
            }),
        )
        .await?;

        Ok(updated)
    }

    /// Delete a record. Only an actual removal is audited.
    pub async fn delete_item(&self, collection: &str, id: impl Into<RecordId>) -> Result<bool> {
        let id = id.into();
        let removed = self.store.delete_item(collection, id.clone()).await?;

        if removed {
            self.admin_action(
                format!("Deleted {}/{}", collection, id),
                json!({"operation": "delete", "collection": collection, "id": id.as_str()}),
            )
            .await?;
        }

        Ok(removed)
    }

    pub async fn reset_to_defaults(&self) -> Result<()> {
        self.store.reset_to_defaults().await?;
        self.admin_action(
            "Reset all collections to the default dataset".to_string(),
            json!({"operation": "reset"}),
        )
        .await
    }

    /// Record a read of portal data by the current user
    pub async fn log_data_access(&self, description: &str, metadata: Option<Value>) -> Result<()> {
        let actor = self.current_actor().await?;
        self.record(AuditAction::DataAccess, description.to_string(), actor, metadata)
            .await
    }

    /// Write the whole store as pretty JSON to `path`, creating parent
    /// directories. Returns the number of records written.
    pub async fn backup_to_file<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let backup = self.store.export_all().await?;
        let document = backup.to_json()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, document).await?;

        tracing::info!(path = %path.display(), records = backup.len(), "Backup written");

        Ok(backup.len())
    }

    /// Write a timestamped backup into the configured backup directory
    pub async fn backup(&self) -> Result<PathBuf> {
        let name = format!("sekolah-backup-{}.json", Utc::now().format("%Y%m%d-%H%M%S%.3f"));
        let path = self.config.backup_dir.join(name);
        self.backup_to_file(&path).await?;
        Ok(path)
    }

    /// Replace the collections named in the document at `path`.
    /// Returns the number of records restored.
    pub async fn restore_from_file<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let document = tokio::fs::read_to_string(path).await?;
        let restored = self.store.import_all(&document).await?;

        self.admin_action(
            format!("Restored {} records from {}", restored, path.display()),
            json!({"operation": "restore", "records": restored}),
        )
        .await?;

        Ok(restored)
    }

    pub async fn audit_entries(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>> {
        let audit = self.audit.clone();
        run_blocking(move || Ok(audit.entries(&filter)?)).await
    }

    pub async fn audit_report(&self, period: ReportPeriod) -> Result<AuditReport> {
        let audit = self.audit.clone();
        run_blocking(move || Ok(audit.report(period)?)).await
    }

    /// Drop audit entries older than `days`. Returns the number remaining.
    pub async fn prune_audit(&self, days: u32) -> Result<usize> {
        let audit = self.audit.clone();
        run_blocking(move || Ok(audit.prune_older_than(days)?)).await
    }

    pub async fn export_audit_csv(&self) -> Result<String> {
        let audit = self.audit.clone();
        run_blocking(move || Ok(audit.export_csv()?)).await
    }

    async fn current_actor(&self) -> Result<AuditActor> {
        let user = self.store.get_current_user().await?;
        Ok(AuditActor::from_user(user.as_ref().map(Record::as_map)))
    }

    async fn admin_action(&self, description: String, metadata: Value) -> Result<()> {
        let actor = self.current_actor().await?;
        self.record(AuditAction::AdminAction, description, actor, Some(metadata))
            .await
    }

    async fn record(
        &self,
        action: AuditAction,
        description: String,
        actor: AuditActor,
        metadata: Option<Value>,
    ) -> Result<()> {
        let audit = self.audit.clone();
        run_blocking(move || {
            audit.log(action, &description, actor, metadata)?;
            Ok(())
        })
        .await
    }
}

impl Clone for Portal {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            audit: self.audit.clone(),
        }
    }
}

async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::Task(e.to_string()))?
}
