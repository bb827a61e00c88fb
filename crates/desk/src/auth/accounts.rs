//! Credential accounts

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::AuthError;

#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

pub struct AccountManager {
    conn: Mutex<Connection>,
}

impl AccountManager {
    pub fn new(db_path: &Path) -> Result<Self, AuthError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)?;
        let manager = Self { conn: Mutex::new(conn) };
        manager.init_schema()?;
        Ok(manager)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, AuthError> {
        let conn = Connection::open_in_memory()?;
        let manager = Self { conn: Mutex::new(conn) };
        manager.init_schema()?;
        Ok(manager)
    }

    fn init_schema(&self) -> Result<(), AuthError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_login TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_email ON accounts(email);

            CREATE TABLE IF NOT EXISTS revoked_sessions (
                session_id TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL
            );
            "
        )?;
        Ok(())
    }

    pub fn create_account(&self, email: &str, password_hash: &str) -> Result<Account, AuthError> {
        let email = normalize_email(email);
        if self.get_by_email(&email)?.is_some() {
            return Err(AuthError::EmailInUse);
        }

        let account = Account {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
            last_login: None,
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO accounts (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                account.id,
                account.email,
                account.password_hash,
                account.created_at.to_rfc3339(),
            ],
        )?;

        Ok(account)
    }

    pub fn get_account(&self, id: &str) -> Result<Option<Account>, AuthError> {
        let conn = self.conn.lock();
        let account = conn
            .query_row(
                "SELECT id, email, password_hash, created_at, last_login FROM accounts WHERE id = ?1",
                [id],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    pub fn get_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        let conn = self.conn.lock();
        let account = conn
            .query_row(
                "SELECT id, email, password_hash, created_at, last_login FROM accounts WHERE email = ?1",
                [normalize_email(email)],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    pub fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AuthError> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE accounts SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )?;

        if rows == 0 {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(())
    }

    pub fn update_last_login(&self, id: &str) -> Result<(), AuthError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE accounts SET last_login = ?1 WHERE id = ?2",
            params![now, id],
        )?;

        if rows == 0 {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(())
    }

    pub fn account_count(&self) -> Result<u32, AuthError> {
        let conn = self.conn.lock();
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Record a signed-out session so its token is refused by later processes.
    /// Rows are dropped once the token itself has expired.
    pub fn revoke_session(&self, session_id: Uuid, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM revoked_sessions WHERE expires_at <= ?1",
            [Utc::now().timestamp()],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO revoked_sessions (session_id, expires_at) VALUES (?1, ?2)",
            params![session_id.to_string(), expires_at.timestamp()],
        )?;
        Ok(())
    }

    pub fn is_session_revoked(&self, session_id: Uuid) -> Result<bool, AuthError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM revoked_sessions WHERE session_id = ?1",
                [session_id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
        last_login: row
            .get::<_, Option<String>>(4)?
            .map(|s| parse_timestamp(4, &s))
            .transpose()?,
    })
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
