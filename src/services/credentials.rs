//! Password hashing, verification and reuse checks.
//!
//! Argon2 is CPU-bound, so every operation runs on the blocking pool.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;
use tokio::task;

use crate::config::SecurityConfig;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to hash password: {0}")]
    Hashing(String),

    #[error("Stored password hash is malformed: {0}")]
    MalformedHash(String),

    #[error("Password task failed: {0}")]
    Task(String),
}

#[derive(Clone)]
pub struct CredentialStore {
    config: SecurityConfig,
}

impl CredentialStore {
    #[must_use]
    pub const fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    pub async fn hash_password(&self, plain: &str) -> Result<String, CredentialError> {
        let plain = plain.to_string();
        let config = self.config.clone();
        task::spawn_blocking(move || hash_password(&plain, &config))
            .await
            .map_err(|e| CredentialError::Task(e.to_string()))?
    }

    /// `Ok(false)` on mismatch; errors only when `hashed` cannot be parsed.
    pub async fn verify_password(&self, hashed: &str, plain: &str) -> Result<bool, CredentialError> {
        let hashed = hashed.to_string();
        let plain = plain.to_string();
        task::spawn_blocking(move || verify_password(&hashed, &plain))
            .await
            .map_err(|e| CredentialError::Task(e.to_string()))?
    }

    /// True if `plain` verifies against any hash in `history`.
    pub async fn was_password_used_before(
        &self,
        plain: &str,
        history: &[String],
    ) -> Result<bool, CredentialError> {
        let plain = plain.to_string();
        let history = history.to_vec();
        task::spawn_blocking(move || {
            for hashed in &history {
                if verify_password(hashed, &plain)? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .await
        .map_err(|e| CredentialError::Task(e.to_string()))?
    }
}

/// Hash a password using Argon2id with the configured cost parameters.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| CredentialError::Hashing(format!("Invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CredentialError::Hashing(e.to_string()))?;

    Ok(hash.to_string())
}

/// Parameters are read back from the PHC string, so hashes made under older
/// settings still verify.
pub fn verify_password(hashed: &str, password: &str) -> Result<bool, CredentialError> {
    let parsed =
        PasswordHash::new(hashed).map_err(|e| CredentialError::MalformedHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
