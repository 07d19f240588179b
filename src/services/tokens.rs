//! Single-use tokens for email verification and password reset.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::TokenConfig;
use crate::db::Store;
use crate::domain::UserId;
use crate::services::clock::Clock;
use crate::services::session::{SESSION_TOKEN_LENGTH, generate_token};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for TokenError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub struct TokenService {
    store: Store,
    clock: Arc<dyn Clock>,
    config: TokenConfig,
}

impl TokenService {
    #[must_use]
    pub fn new(store: Store, clock: Arc<dyn Clock>, config: TokenConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    fn is_expired(&self, created_at: &str, ttl_hours: Option<u64>) -> bool {
        let Some(hours) = ttl_hours else {
            return false;
        };
        let Ok(created) = DateTime::parse_from_rfc3339(created_at) else {
            return true;
        };
        let ttl = chrono::Duration::hours(i64::try_from(hours).unwrap_or(i64::MAX / 3_600_000));
        created.with_timezone(&Utc) + ttl <= self.clock.now_utc()
    }

    pub async fn issue_verification_token(&self, user_id: UserId) -> Result<String, TokenError> {
        let token = generate_token(SESSION_TOKEN_LENGTH);
        let now = self.clock.now_utc().to_rfc3339();
        self.store
            .token_repo()
            .insert_verification(&token, user_id, &now)
            .await?;
        Ok(token)
    }

    /// Deletes the token and marks its user verified.
    pub async fn consume_verification_token(&self, token: &str) -> Result<UserId, TokenError> {
        let repo = self.store.token_repo();
        let row = repo
            .find_verification(token)
            .await?
            .ok_or(TokenError::InvalidToken)?;

        if self.is_expired(&row.created_at, self.config.verification_ttl_hours) {
            repo.delete_verification(token).await?;
            debug!("Expired verification token discarded");
            return Err(TokenError::InvalidToken);
        }

        let user_id = UserId::from_uuid(row.user_id);
        if repo.consume_verification(token, user_id).await? {
            Ok(user_id)
        } else {
            Err(TokenError::InvalidToken)
        }
    }

    pub async fn issue_reset_token(&self, email: &str) -> Result<String, TokenError> {
        let token = generate_token(SESSION_TOKEN_LENGTH);
        let now = self.clock.now_utc().to_rfc3339();
        self.store
            .token_repo()
            .insert_reset(&token, email, &now)
            .await?;
        Ok(token)
    }

    /// Returns the email a live reset token was issued for, without consuming it.
    pub async fn check_reset_token(&self, token: &str) -> Result<String, TokenError> {
        if token.is_empty() {
            return Err(TokenError::InvalidToken);
        }

        let repo = self.store.token_repo();
        let row = repo
            .find_reset(token)
            .await?
            .ok_or(TokenError::InvalidToken)?;

        if self.is_expired(&row.created_at, self.config.reset_ttl_hours) {
            repo.delete_reset(token).await?;
            debug!("Expired reset token discarded");
            return Err(TokenError::InvalidToken);
        }

        Ok(row.email)
    }

    /// Consumes the reset token and stores `new_hash` for `user_id` in one transaction.
    /// A token that another request already consumed is `InvalidToken`.
    pub async fn redeem_reset_token(
        &self,
        token: &str,
        user_id: UserId,
        new_hash: &str,
    ) -> Result<(), TokenError> {
        if self
            .store
            .user_repo()
            .reset_password(user_id, new_hash, token)
            .await?
        {
            Ok(())
        } else {
            Err(TokenError::InvalidToken)
        }
    }
}
