//! Self-hosted identity provider backed by the accounts table

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use argon2::Argon2;
use userdesk_common::crypto::{hash_password, password_hasher, random_token, verify_password};
use userdesk_common::{check_password, Session};

use crate::config::AuthSettings;
use super::{
    AccountManager, AuthError, IdentityProvider, ResetMailer, ResetTicketManager,
    SessionManager, SessionSubscription,
};

pub struct LocalIdentityProvider {
    accounts: AccountManager,
    sessions: SessionManager,
    resets: ResetTicketManager,
    mailer: Arc<dyn ResetMailer>,
    current: watch::Sender<Option<Session>>,
    hasher: Argon2<'static>,
}

impl LocalIdentityProvider {
    pub fn new(
        accounts: AccountManager,
        settings: &AuthSettings,
        mailer: Arc<dyn ResetMailer>,
    ) -> Result<Self, AuthError> {
        let jwt_secret = match &settings.jwt_secret {
            Some(secret) => secret.clone(),
            None => random_token(32)?,
        };

        let (current, _) = watch::channel(None);

        Ok(Self {
            accounts,
            sessions: SessionManager::new(jwt_secret, settings.session_expiry_hours),
            resets: ResetTicketManager::new(settings.reset_expiry_minutes),
            mailer,
            current,
            hasher: password_hasher(settings.argon2_memory_kib, settings.argon2_iterations)?,
        })
    }

    pub fn accounts(&self) -> &AccountManager {
        &self.accounts
    }

    /// Publish `session` as current. The session it replaces is revoked.
    fn replace_current(&self, session: Option<Session>) -> Result<(), AuthError> {
        let previous = self.current.send_replace(session);
        if let Some(previous) = previous {
            self.sessions.remove_session(previous.id);
            self.accounts.revoke_session(previous.id, previous.expires_at)?;
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn subscribe(&self) -> SessionSubscription {
        self.current.subscribe()
    }

    async fn sign_in_with_credentials(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let account = self
            .accounts
            .get_by_email(email)?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &account.password_hash)? {
            debug!("Password mismatch for account {}", account.id);
            return Err(AuthError::InvalidCredentials);
        }

        if let Some(previous) = account.last_login {
            debug!("Account {} last signed in at {}", account.id, previous.to_rfc3339());
        }
        self.accounts.update_last_login(&account.id)?;
        let session = self.sessions.create_session(&account.id)?;
        info!("Signed in account {}", account.id);

        self.replace_current(Some(session.clone()))?;
        Ok(session)
    }

    async fn create_account(&self, email: &str, password: &str) -> Result<String, AuthError> {
        check_password(password).map_err(AuthError::WeakPassword)?;

        let hash = hash_password(&self.hasher, password)?;
        let account = self.accounts.create_account(email, &hash)?;
        info!("Created account {}", account.id);

        Ok(account.id)
    }

    async fn resume_session(&self, token: &str) -> Result<Session, AuthError> {
        let session = self.sessions.validate_token(token)?;
        if self.accounts.is_session_revoked(session.id)? {
            self.sessions.remove_session(session.id);
            return Err(AuthError::SessionNotFound);
        }
        if self.accounts.get_account(&session.user_id)?.is_none() {
            self.sessions.remove_session(session.id);
            return Err(AuthError::SessionNotFound);
        }

        if self.current.borrow().as_ref().map(|s| s.id) == Some(session.id) {
            return Ok(session);
        }
        self.replace_current(Some(session.clone()))?;
        info!("Resumed session for account {}", session.user_id);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if self.current.borrow().is_none() {
            debug!("Sign-out without an active session");
        }
        self.replace_current(None)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let Some(account) = self.accounts.get_by_email(email)? else {
            warn!("Password reset requested for unknown email");
            return Err(AuthError::UnknownEmail);
        };

        self.resets.cleanup_expired();
        let (code, ticket) = self.resets.issue(&account.id);
        self.mailer.deliver(&account.email, &code, ticket.expires_at).await
    }

    async fn confirm_password_reset(&self, code: &str, new_password: &str) -> Result<(), AuthError> {
        check_password(new_password).map_err(AuthError::WeakPassword)?;

        let ticket = self.resets.redeem(code)?;
        let hash = hash_password(&self.hasher, new_password)?;
        self.accounts.set_password_hash(&ticket.user_id, &hash)?;
        info!("Password reset completed for account {}", ticket.user_id);

        Ok(())
    }
}
