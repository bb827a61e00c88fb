//! SQLite-backed document store
//!
//! Each document is a JSON body in the `documents` table, keyed by
//! `(collection, id)`. The key is not repeated inside the body.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;
use userdesk_common::{Profile, ProfileChanges};

use super::{RecordStore, StoreError};

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open(path)?)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            "#,
        )?;
        Ok(())
    }

    pub fn count(&self, collection: &str) -> Result<u32, StoreError> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn encode_body(profile: &Profile) -> Result<String, StoreError> {
    let mut body = serde_json::to_value(profile)?;
    if let Value::Object(map) = &mut body {
        map.remove("id");
    }
    Ok(body.to_string())
}

fn decode_body(id: &str, body: &str) -> Result<Profile, StoreError> {
    let mut value: Value = serde_json::from_str(body)?;
    if let Value::Object(map) = &mut value {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Profile>, StoreError> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|body| decode_body(id, &body)).transpose()
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Profile>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY created_at, rowid",
        )?;

        let rows = stmt
            .query_map([collection], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter().map(|(id, body)| decode_body(id, body)).collect()
    }

    async fn update_partial(&self, collection: &str, id: &str, changes: &ProfileChanges) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(body) = body else {
            return Err(StoreError::not_found(collection, id));
        };

        let mut profile = decode_body(id, &body)?;
        changes.apply_to(&mut profile);

        tx.execute(
            "UPDATE documents SET body = ?1, updated_at = ?2 WHERE collection = ?3 AND id = ?4",
            params![encode_body(&profile)?, Utc::now().to_rfc3339(), collection, id],
        )?;
        tx.commit()?;

        debug!("Updated document {}/{}", collection, id);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;

        if rows == 0 {
            return Err(StoreError::not_found(collection, id));
        }

        debug!("Deleted document {}/{}", collection, id);
        Ok(())
    }

    async fn create(&self, collection: &str, id: &str, profile: &Profile) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        if exists.is_some() {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO documents (collection, id, body, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![collection, id, encode_body(profile)?, now],
        )?;

        debug!("Created document {}/{}", collection, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::profile;
    use userdesk_common::{Gender, Role, USERS_COLLECTION};

    #[tokio::test]
    async fn test_document_crud() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let alice = profile("1", "alice", Role::Admin);
        let bob = profile("2", "bob", Role::User);

        store.create(USERS_COLLECTION, "1", &alice).await.unwrap();
        store.create(USERS_COLLECTION, "2", &bob).await.unwrap();

        let fetched = store.get_by_id(USERS_COLLECTION, "2").await.unwrap().unwrap();
        assert_eq!(fetched, bob);

        let all = store.get_all(USERS_COLLECTION).await.unwrap();
        assert_eq!(all.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);

        store.delete(USERS_COLLECTION, "1").await.unwrap();
        assert!(store.get_by_id(USERS_COLLECTION, "1").await.unwrap().is_none());
        assert_eq!(store.count(USERS_COLLECTION).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_partial_update_merges_fields() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.create(USERS_COLLECTION, "2", &profile("2", "bob", Role::User)).await.unwrap();

        let changes = ProfileChanges {
            mobile: Some("9999999999".to_string()),
            gender: Some(Gender::Other),
            ..Default::default()
        };
        store.update_partial(USERS_COLLECTION, "2", &changes).await.unwrap();

        let updated = store.get_by_id(USERS_COLLECTION, "2").await.unwrap().unwrap();
        assert_eq!(updated.mobile, "9999999999");
        assert_eq!(updated.gender, Gender::Other);
        assert_eq!(updated.username, "bob");
        assert_eq!(updated.role, Role::User);
    }

    #[tokio::test]
    async fn test_missing_document_errors() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let changes = ProfileChanges { username: Some("x".to_string()), ..Default::default() };

        let err = store.update_partial(USERS_COLLECTION, "404", &changes).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.delete(USERS_COLLECTION, "404").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_rejects_existing_id() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let bob = profile("2", "bob", Role::User);
        store.create(USERS_COLLECTION, "2", &bob).await.unwrap();

        assert!(matches!(
            store.create(USERS_COLLECTION, "2", &bob).await,
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.create("archive", "2", &profile("2", "bob", Role::User)).await.unwrap();

        assert!(store.get_all(USERS_COLLECTION).await.unwrap().is_empty());
        assert!(store.get_by_id(USERS_COLLECTION, "2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_body_omits_key() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.create(USERS_COLLECTION, "7", &profile("7", "gil", Role::User)).await.unwrap();

        let body: String = store
            .conn
            .lock()
            .query_row("SELECT body FROM documents WHERE id = '7'", [], |row| row.get(0))
            .unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["username"], "gil");
    }
}
