//! Password reset tickets

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::RwLock;
use chrono::{DateTime, Utc, Duration};
use tracing::info;
use userdesk_common::crypto::sha256_hex;
use super::AuthError;

const CODE_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct ResetTicket {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetTicket {
    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// Delivers reset codes to the account holder.
#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn deliver(&self, email: &str, code: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError>;
}

/// Writes the reset code to the log; the log is the delivery channel.
pub struct LogMailer;

#[async_trait]
impl ResetMailer for LogMailer {
    async fn deliver(&self, email: &str, code: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        info!(
            "Password reset code for {}: {} (valid until {})",
            email,
            code,
            expires_at.format("%Y-%m-%d %H:%M UTC")
        );
        Ok(())
    }
}

/// Tickets are keyed by the digest of their code, never the code itself.
pub struct ResetTicketManager {
    tickets: Arc<RwLock<HashMap<String, ResetTicket>>>,
    expiry_minutes: u32,
}

impl ResetTicketManager {
    pub fn new(expiry_minutes: u32) -> Self {
        Self {
            tickets: Arc::new(RwLock::new(HashMap::new())),
            expiry_minutes,
        }
    }

    /// Issue a fresh code, replacing any outstanding ticket for the same account.
    pub fn issue(&self, user_id: &str) -> (String, ResetTicket) {
        let code = Self::generate_code();

        let ticket = ResetTicket {
            user_id: user_id.to_string(),
            expires_at: Utc::now() + Duration::minutes(self.expiry_minutes as i64),
        };

        let mut tickets = self.tickets.write();
        tickets.retain(|_, t| t.user_id != user_id);
        tickets.insert(Self::key(&code), ticket.clone());

        (code, ticket)
    }

    fn generate_code() -> String {
        use rand::Rng;
        const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
        let mut rng = rand::rng();
        (0..CODE_LEN)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }

    fn key(code: &str) -> String {
        sha256_hex(code.trim().to_uppercase().as_bytes())
    }

    /// Consume a code. Valid codes work exactly once.
    pub fn redeem(&self, code: &str) -> Result<ResetTicket, AuthError> {
        let ticket = self
            .tickets
            .write()
            .remove(&Self::key(code))
            .ok_or(AuthError::InvalidResetCode)?;

        if !ticket.is_valid() {
            return Err(AuthError::InvalidResetCode);
        }

        Ok(ticket)
    }

    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.tickets.write().retain(|_, ticket| ticket.expires_at > now);
    }
}
