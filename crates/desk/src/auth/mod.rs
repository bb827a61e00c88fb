//! Identity provider: accounts, sessions and password reset

mod accounts;
mod session;
mod reset;
mod local;

pub use accounts::*;
pub use session::*;
pub use reset::*;
pub use local::*;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use userdesk_common::Session;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("No account registered for this email")]
    UnknownEmail,
    #[error("Email already in use")]
    EmailInUse,
    #[error("Session expired")]
    SessionExpired,
    #[error("Session not found")]
    SessionNotFound,
    #[error("Reset code is invalid or expired")]
    InvalidResetCode,
    #[error("Password rejected: {0}")]
    WeakPassword(&'static str),
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] userdesk_common::crypto::CryptoError),
}

/// Receiver side of the session-change stream. Dropping it unsubscribes.
pub type SessionSubscription = watch::Receiver<Option<Session>>;

/// Authentication service consumed by the dashboard and account flows.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session state followed by every later transition.
    fn subscribe(&self) -> SessionSubscription;

    async fn sign_in_with_credentials(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Register credentials and return the new subject id. Does not sign in.
    async fn create_account(&self, email: &str, password: &str) -> Result<String, AuthError>;

    /// Re-establish a session from a token issued earlier, possibly by another process.
    async fn resume_session(&self, token: &str) -> Result<Session, AuthError>;

    /// End the current session and revoke its token.
    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    async fn confirm_password_reset(&self, code: &str, new_password: &str) -> Result<(), AuthError>;
}
