//! Session management

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use parking_lot::RwLock;
use uuid::Uuid;
use chrono::{DateTime, Utc, Duration};
use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey};
use serde::{Deserialize, Serialize};
use userdesk_common::Session;
use super::AuthError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub session_id: String,
    pub exp: i64,
    pub iat: i64,
}

/// Issues and checks signed session tokens.
///
/// Tokens signed with the same secret by an earlier process are adopted on
/// first validation. Revocations here only cover this process; persistent
/// revocation is the identity provider's job.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    revoked: Arc<RwLock<HashSet<Uuid>>>,
    jwt_secret: String,
    expiry_hours: u32,
}

impl SessionManager {
    pub fn new(jwt_secret: String, expiry_hours: u32) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            revoked: Arc::new(RwLock::new(HashSet::new())),
            jwt_secret,
            expiry_hours,
        }
    }

    pub fn create_session(&self, user_id: &str) -> Result<Session, AuthError> {
        self.cleanup_expired();

        let now = Utc::now();
        let expiry = now + Duration::hours(self.expiry_hours as i64);
        let id = Uuid::new_v4();

        let claims = Claims {
            sub: user_id.to_string(),
            session_id: id.to_string(),
            exp: expiry.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        let session = Session {
            id,
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: expiry,
            token,
        };

        self.sessions.write().insert(session.id, session.clone());

        Ok(session)
    }

    pub fn validate_token(&self, token: &str) -> Result<Session, AuthError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;
        let claims = token_data.claims;

        let session_id = Uuid::parse_str(&claims.session_id)
            .map_err(|_| AuthError::SessionNotFound)?;
        if self.revoked.read().contains(&session_id) {
            return Err(AuthError::SessionNotFound);
        }

        let session = match self.get_session(session_id) {
            Ok(session) => session,
            Err(AuthError::SessionNotFound) => self.adopt(session_id, &claims, token)?,
            Err(e) => return Err(e),
        };

        if session.user_id != claims.sub {
            return Err(AuthError::SessionNotFound);
        }

        Ok(session)
    }

    fn adopt(&self, session_id: Uuid, claims: &Claims, token: &str) -> Result<Session, AuthError> {
        let (Some(created_at), Some(expires_at)) = (
            DateTime::<Utc>::from_timestamp(claims.iat, 0),
            DateTime::<Utc>::from_timestamp(claims.exp, 0),
        ) else {
            return Err(AuthError::SessionNotFound);
        };

        let session = Session {
            id: session_id,
            user_id: claims.sub.clone(),
            created_at,
            expires_at,
            token: token.to_string(),
        };
        if session.is_expired() {
            return Err(AuthError::SessionExpired);
        }

        self.sessions.write().insert(session_id, session.clone());
        Ok(session)
    }

    pub fn get_session(&self, session_id: Uuid) -> Result<Session, AuthError> {
        let sessions = self.sessions.read();
        let session = sessions.get(&session_id).ok_or(AuthError::SessionNotFound)?;

        if session.is_expired() {
            drop(sessions);
            self.sessions.write().remove(&session_id);
            return Err(AuthError::SessionExpired);
        }

        Ok(session.clone())
    }

    pub fn remove_session(&self, session_id: Uuid) {
        self.sessions.write().remove(&session_id);
        self.revoked.write().insert(session_id);
    }

    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.sessions.write().retain(|_, session| session.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let manager = SessionManager::new("test_secret".to_string(), 24);

        let session = manager.create_session("user-1").unwrap();
        assert_eq!(session.user_id, "user-1");

        let validated = manager.validate_token(&session.token).unwrap();
        assert_eq!(validated.id, session.id);
        assert_eq!(manager.sessions.read().len(), 1);

        manager.remove_session(session.id);
        assert!(manager.get_session(session.id).is_err());
        assert!(matches!(
            manager.validate_token(&session.token),
            Err(AuthError::SessionNotFound)
        ));
    }

    #[test]
    fn test_foreign_token_rejected() {
        let issuer = SessionManager::new("secret_a".to_string(), 24);
        let verifier = SessionManager::new("secret_b".to_string(), 24);

        let session = issuer.create_session("user-1").unwrap();
        assert!(matches!(
            verifier.validate_token(&session.token),
            Err(AuthError::JwtError(_))
        ));
    }

    #[test]
    fn test_token_from_earlier_process_adopted() {
        let issuer = SessionManager::new("shared".to_string(), 24);
        let later = SessionManager::new("shared".to_string(), 24);

        let session = issuer.create_session("user-1").unwrap();
        let adopted = later.validate_token(&session.token).unwrap();
        assert_eq!(adopted.id, session.id);
        assert_eq!(adopted.user_id, "user-1");
        assert_eq!(adopted.expires_at.timestamp(), session.expires_at.timestamp());
        assert!(later.get_session(session.id).is_ok());
    }

    #[test]
    fn test_expired_session_removed() {
        let manager = SessionManager::new("test_secret".to_string(), 0);
        let session = manager.create_session("user-1").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(matches!(
            manager.get_session(session.id),
            Err(AuthError::SessionExpired)
        ));
        manager.cleanup_expired();
        assert!(manager.sessions.read().is_empty());
    }

    #[test]
    fn test_issuing_prunes_expired_sessions() {
        let manager = SessionManager::new("test_secret".to_string(), 0);
        let stale = manager.create_session("user-1").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let fresh = manager.create_session("user-2").unwrap();

        let sessions = manager.sessions.read();
        assert!(!sessions.contains_key(&stale.id));
        assert!(sessions.contains_key(&fresh.id));
    }
}
