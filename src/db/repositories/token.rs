use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use crate::domain::UserId;
use crate::entities::{password_resets, users, verification_tokens};

pub struct TokenRepository {
    conn: DatabaseConnection,
}

impl TokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert_verification(
        &self,
        token: &str,
        user_id: UserId,
        created_at: &str,
    ) -> Result<()> {
        verification_tokens::Entity::insert(verification_tokens::ActiveModel {
            token: Set(token.to_string()),
            user_id: Set(user_id.as_uuid()),
            created_at: Set(created_at.to_string()),
        })
        .exec(&self.conn)
        .await
        .context("Failed to store verification token")?;
        Ok(())
    }

    pub async fn find_verification(&self, token: &str) -> Result<Option<verification_tokens::Model>> {
        verification_tokens::Entity::find_by_id(token.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query verification token")
    }

    pub async fn delete_verification(&self, token: &str) -> Result<bool> {
        let result = verification_tokens::Entity::delete_by_id(token.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to delete verification token")?;
        Ok(result.rows_affected > 0)
    }

    /// Deletes the token and marks its user verified in one transaction.
    /// Returns `false` when the token was already gone.
    pub async fn consume_verification(&self, token: &str, user_id: UserId) -> Result<bool> {
        let txn = self.conn.begin().await?;

        let deleted = verification_tokens::Entity::delete_by_id(token.to_string())
            .exec(&txn)
            .await
            .context("Failed to delete verification token")?;
        if deleted.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        let user = users::Entity::find_by_id(user_id.as_uuid())
            .filter(users::Column::DeletedAt.is_null())
            .one(&txn)
            .await
            .context("Failed to query user for verification")?;
        let Some(user) = user else {
            txn.rollback().await?;
            return Ok(false);
        };

        let mut active: users::ActiveModel = user.into();
        active.is_verified = Set(true);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }

    pub async fn insert_reset(&self, token: &str, email: &str, created_at: &str) -> Result<()> {
        password_resets::Entity::insert(password_resets::ActiveModel {
            token: Set(token.to_string()),
            email: Set(email.to_string()),
            created_at: Set(created_at.to_string()),
        })
        .exec(&self.conn)
        .await
        .context("Failed to store password reset token")?;
        Ok(())
    }

    pub async fn find_reset(&self, token: &str) -> Result<Option<password_resets::Model>> {
        password_resets::Entity::find_by_id(token.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query password reset token")
    }

    pub async fn delete_reset(&self, token: &str) -> Result<bool> {
        let result = password_resets::Entity::delete_by_id(token.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to delete password reset token")?;
        Ok(result.rows_affected > 0)
    }
}
