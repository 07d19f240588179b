//! Opaque session tokens bound to user ids in a [`KeyValueStore`].
//!
//! The binding's presence is the only proof of authentication. Several live
//! tokens may point at the same user.

use rand::{Rng, distr::Alphanumeric};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::UserId;
use crate::services::kv::{KeyValueStore, KvError};

pub const SESSION_TOKEN_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<KvError> for SessionError {
    fn from(err: KvError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

pub struct SessionManager {
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn create_session(&self, user_id: UserId) -> Result<String, SessionError> {
        let token = generate_token(SESSION_TOKEN_LENGTH);
        self.kv
            .set(&token, &user_id.to_string(), Some(self.ttl))
            .await?;
        debug!(user_id = %user_id, "Session created");
        Ok(token)
    }

    pub async fn resolve_session(&self, token: &str) -> Result<UserId, SessionError> {
        if token.is_empty() {
            return Err(SessionError::NotFound);
        }

        let value = self.kv.get(token).await?.ok_or(SessionError::NotFound)?;
        value.parse().map_err(|_| {
            warn!("Session binding holds an invalid user id");
            SessionError::NotFound
        })
    }

    /// Best-effort and idempotent: store errors are logged, never returned.
    pub async fn destroy_session(&self, token: &str) {
        if token.is_empty() {
            return;
        }
        if let Err(e) = self.kv.delete(token).await {
            warn!(error = %e, "Failed to delete session binding");
        }
    }

    /// Rebinds `token` with a fresh TTL.
    pub async fn refresh_session(&self, token: &str, user_id: UserId) -> Result<(), SessionError> {
        if token.is_empty() {
            return Err(SessionError::NotFound);
        }
        self.kv
            .set(token, &user_id.to_string(), Some(self.ttl))
            .await?;
        Ok(())
    }
}

/// Random alphanumeric string from the thread-local CSPRNG.
#[must_use]
pub fn generate_token(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
