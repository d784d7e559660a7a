//! Session slot and credential lookup
//!
//! The slot holds at most one user record and never expires. Credentials
//! are compared as plain strings: this is a lookup against seeded demo
//! accounts, not an authentication mechanism.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::collection::Collection;
use crate::record::Record;
use crate::store::LocalStore;
use crate::{records, Result};

/// Field holding the plaintext secret in `users` records
pub const SECRET_FIELD: &str = "password";

impl LocalStore {
    pub async fn get_current_user(&self) -> Result<Option<Record>> {
        self.run(read_slot).await
    }

    /// Replace the session slot. `None` clears it. The secret field is
    /// never written to the slot.
    pub async fn set_current_user(&self, user: Option<Record>) -> Result<()> {
        self.run(move |conn| write_slot(conn, user.as_ref())).await
    }

    /// Clear the slot, returning whoever was signed in
    pub async fn logout(&self) -> Result<Option<Record>> {
        let previous = self
            .run(|conn| {
                let previous = read_slot(conn)?;
                write_slot(conn, None)?;
                Ok(previous)
            })
            .await?;

        if let Some(user) = &previous {
            tracing::info!(user = %user.get_str("id").unwrap_or_default(), "Signed out");
        }

        Ok(previous)
    }

    /// Match `identifier` against `username` or `email` and `secret`
    /// against `password`. On success the user, minus its secret, becomes
    /// the current session and is returned. On failure nothing changes.
    pub async fn authenticate(&self, identifier: &str, secret: &str) -> Result<Option<Record>> {
        let identifier = identifier.to_string();
        let secret = secret.to_string();

        let user = self
            .run(move |conn| {
                let found = records::list(conn, Collection::Users, None)?
                    .into_iter()
                    .find(|user| {
                        let named = user.get_str("username") == Some(identifier.as_str())
                            || user.get_str("email") == Some(identifier.as_str());
                        named && user.get_str(SECRET_FIELD) == Some(secret.as_str())
                    });

                match found {
                    Some(user) => {
                        let user = without_secret(user);
                        write_slot(conn, Some(&user))?;
                        Ok(Some(user))
                    }
                    None => Ok(None),
                }
            })
            .await?;

        match &user {
            Some(user) => tracing::info!(
                user = %user.get_str("id").unwrap_or_default(),
                role = %user.get_str("role").unwrap_or_default(),
                "Signed in"
            ),
            None => tracing::warn!("Sign-in rejected"),
        }

        Ok(user)
    }
}

fn without_secret(mut user: Record) -> Record {
    user.remove(SECRET_FIELD);
    user
}

fn read_slot(conn: &Connection) -> Result<Option<Record>> {
    let json: Option<String> = conn
        .query_row("SELECT user_json FROM session_slot WHERE slot = 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    match json {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

fn write_slot(conn: &Connection, user: Option<&Record>) -> Result<()> {
    match user {
        Some(user) => {
            let user = without_secret(user.clone());
            conn.execute(
                r#"
                INSERT INTO session_slot (slot, user_json, signed_in_at)
                VALUES (1, ?1, ?2)
                ON CONFLICT(slot)
                DO UPDATE SET user_json = excluded.user_json, signed_in_at = excluded.signed_in_at
                "#,
                params![serde_json::to_string(&user)?, Utc::now().to_rfc3339()],
            )?;
        }
        None => {
            conn.execute("DELETE FROM session_slot", [])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> LocalStore {
        let store = LocalStore::in_memory();
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_authenticate_by_email() {
        let store = seeded().await;

        let user = store
            .authenticate("admin@sekolah.id", "admin123")
            .await
            .unwrap()
            .expect("admin should sign in");
        assert_eq!(user.get_str("role"), Some("admin"));
        assert!(!user.contains(SECRET_FIELD));

        let current = store.get_current_user().await.unwrap().unwrap();
        assert_eq!(current, user);
    }

    #[tokio::test]
    async fn test_authenticate_by_username() {
        let store = seeded().await;
        let user = store.authenticate("guru", "guru123").await.unwrap().unwrap();
        assert_eq!(user.get_str("email"), Some("guru@sekolah.id"));
    }

    #[tokio::test]
    async fn test_wrong_secret_leaves_slot_untouched() {
        let store = seeded().await;
        assert!(store
            .authenticate("admin@sekolah.id", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(store.get_current_user().await.unwrap().is_none());

        store.authenticate("ortu", "ortu123").await.unwrap().unwrap();
        assert!(store
            .authenticate("admin@sekolah.id", "wrong")
            .await
            .unwrap()
            .is_none());
        let current = store.get_current_user().await.unwrap().unwrap();
        assert_eq!(current.get_str("id"), Some("ortu"));
    }

    #[tokio::test]
    async fn test_secret_must_match_same_user() {
        let store = seeded().await;
        // guru's secret does not open the admin account
        assert!(store
            .authenticate("admin@sekolah.id", "guru123")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_set_current_user_strips_secret() {
        let store = LocalStore::in_memory().with_default_seed(false);
        let user = Record::new()
            .with("id", "tamu")
            .with("name", "Tamu")
            .with(SECRET_FIELD, "rahasia");

        store.set_current_user(Some(user)).await.unwrap();
        let current = store.get_current_user().await.unwrap().unwrap();
        assert_eq!(current.get_str("name"), Some("Tamu"));
        assert!(!current.contains(SECRET_FIELD));

        store.set_current_user(None).await.unwrap();
        assert!(store.get_current_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout() {
        let store = seeded().await;
        assert!(store.logout().await.unwrap().is_none());

        store.authenticate("admin", "admin123").await.unwrap().unwrap();
        let previous = store.logout().await.unwrap().unwrap();
        assert_eq!(previous.get_str("id"), Some("admin"));
        assert!(store.get_current_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_survives_reset() {
        let store = seeded().await;
        store.authenticate("admin", "admin123").await.unwrap().unwrap();
        store.reset_to_defaults().await.unwrap();
        assert!(store.get_current_user().await.unwrap().is_some());
    }
}
