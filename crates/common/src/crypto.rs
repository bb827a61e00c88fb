//! Cryptographic utilities for userdesk

use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, ParamsBuilder, Version};
use ring::digest::{Context, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;

/// Argon2id memory cost in KiB.
pub const DEFAULT_ARGON2_MEMORY_KIB: u32 = 19 * 1024;
pub const DEFAULT_ARGON2_ITERATIONS: u32 = 2;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Random generator failure")]
    RandomError,
    #[error("Invalid Argon2 parameters: {0}")]
    InvalidParams(String),
    #[error("Password hashing error: {0}")]
    PasswordHash(String),
}

impl From<password_hash::Error> for CryptoError {
    fn from(err: password_hash::Error) -> Self {
        CryptoError::PasswordHash(err.to_string())
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    hex_encode(digest.as_ref())
}

pub fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn random_token(len: usize) -> Result<String, CryptoError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes).map_err(|_| CryptoError::RandomError)?;
    Ok(BASE64.encode(&bytes))
}

/// Argon2id hasher with the given memory and time cost.
pub fn password_hasher(memory_kib: u32, iterations: u32) -> Result<Argon2<'static>, CryptoError> {
    let params = ParamsBuilder::new()
        .m_cost(memory_kib)
        .t_cost(iterations)
        .p_cost(1)
        .build()
        .map_err(|e| CryptoError::InvalidParams(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password into a PHC string.
pub fn hash_password(hasher: &Argon2<'_>, password: &str) -> Result<String, CryptoError> {
    let mut salt = [0u8; password_hash::Salt::RECOMMENDED_LENGTH];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| CryptoError::RandomError)?;
    let salt = SaltString::encode_b64(&salt)?;

    let hash = hasher.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string. Cost parameters come from the string.
pub fn verify_password(password: &str, encoded: &str) -> Result<bool, CryptoError> {
    let parsed = PasswordHash::new(encoded)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
