//! Shared fixtures for unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use uuid::Uuid;
use userdesk_common::{Gender, Profile, ProfileChanges, Role, Session, USERS_COLLECTION};

use crate::auth::{AccountManager, AuthError, LocalIdentityProvider, ResetMailer};
use crate::config::AuthSettings;
use crate::store::{RecordStore, SqliteRecordStore, StoreError};

pub fn profile(id: &str, username: &str, role: Role) -> Profile {
    Profile {
        id: id.to_string(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        mobile: "1234567890".to_string(),
        gender: Gender::Other,
        dob: NaiveDate::from_ymd_opt(1990, 5, 17).expect("valid date"),
        address: format!("{} Example Road", username),
        role,
    }
}

pub fn session_for(user_id: &str) -> Session {
    let now = Utc::now();
    Session {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        created_at: now,
        expires_at: now + Duration::hours(1),
        token: String::new(),
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ResetMailer for RecordingMailer {
    async fn deliver(&self, email: &str, code: &str, _expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        self.sent.lock().push((email.to_string(), code.to_string()));
        Ok(())
    }
}

pub fn test_settings() -> AuthSettings {
    AuthSettings {
        jwt_secret: Some("test_secret".to_string()),
        argon2_memory_kib: 64,
        argon2_iterations: 1,
        ..AuthSettings::default()
    }
}

pub fn provider_with(mailer: Arc<RecordingMailer>) -> LocalIdentityProvider {
    let accounts = AccountManager::open_in_memory().expect("in-memory accounts");
    LocalIdentityProvider::new(accounts, &test_settings(), mailer).expect("provider")
}

/// In-memory store whose operations can be switched to fail.
pub struct FlakyStore {
    inner: SqliteRecordStore,
    fail_reads: AtomicBool,
    fail_list: AtomicBool,
    fail_writes: AtomicBool,
    list_calls: AtomicUsize,
    rewrite_on_update: Mutex<Option<ProfileChanges>>,
}

impl FlakyStore {
    pub async fn seeded(profiles: Vec<Profile>) -> Self {
        let store = Self {
            inner: SqliteRecordStore::open_in_memory().expect("in-memory store"),
            fail_reads: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            rewrite_on_update: Mutex::new(None),
        };
        for profile in profiles {
            store.insert(profile).await;
        }
        store
    }

    pub async fn insert(&self, profile: Profile) {
        self.inner
            .create(USERS_COLLECTION, &profile.id, &profile)
            .await
            .expect("seed profile");
    }

    pub async fn document(&self, id: &str) -> Option<Profile> {
        self.inner.get_by_id(USERS_COLLECTION, id).await.expect("read profile")
    }

    pub async fn remove_behind_the_scenes(&self, id: &str) {
        self.inner.delete(USERS_COLLECTION, id).await.expect("remove profile");
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_list(&self, on: bool) {
        self.fail_list.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Apply `changes` on top of the next successful update, as a server-side rewrite would.
    pub fn rewrite_next_update(&self, changes: ProfileChanges) {
        *self.rewrite_on_update.lock() = Some(changes);
    }

    pub fn roster_fetches(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Service("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Profile>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.get_by_id(collection, id).await
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Profile>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_list)?;
        self.inner.get_all(collection).await
    }

    async fn update_partial(&self, collection: &str, id: &str, changes: &ProfileChanges) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.update_partial(collection, id, changes).await?;

        let rewrite = self.rewrite_on_update.lock().take();
        match rewrite {
            Some(rewrite) => self.inner.update_partial(collection, id, &rewrite).await,
            None => Ok(()),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.delete(collection, id).await
    }

    async fn create(&self, collection: &str, id: &str, profile: &Profile) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.create(collection, id, profile).await
    }
}
