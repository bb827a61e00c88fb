//! Profile document store

mod sqlite;

pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;
use thiserror::Error;
use userdesk_common::{Profile, ProfileChanges};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },
    #[error("Service error: {0}")]
    Service(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("Malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound { collection: collection.to_string(), id: id.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Document collections keyed by identity id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Profile>, StoreError>;

    async fn get_all(&self, collection: &str) -> Result<Vec<Profile>, StoreError>;

    /// Merge `changes` into an existing document. Absent documents are `NotFound`.
    async fn update_partial(&self, collection: &str, id: &str, changes: &ProfileChanges) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn create(&self, collection: &str, id: &str, profile: &Profile) -> Result<(), StoreError>;
}
