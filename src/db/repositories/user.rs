use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;

use crate::domain::{RoleName, UserId};
use crate::entities::{password_history, password_resets, roles, user_roles, users};

/// User data returned from repository (without sensitive password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: UserId::from_uuid(model.id),
            username: model.username,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            address: model.address,
            is_verified: model.is_verified,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Row data for a fresh registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub username: String,
    pub email: String,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn active() -> Condition {
        Condition::all().add(users::Column::DeletedAt.is_null())
    }

    /// Get a non-deleted user by ID
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id.as_uuid())
            .filter(Self::active())
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Get user by ID together with the stored password hash
    pub async fn get_by_id_with_password(&self, id: UserId) -> Result<Option<(User, String)>> {
        let user = users::Entity::find_by_id(id.as_uuid())
            .filter(Self::active())
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(|u| {
            let password_hash = u.password_hash.clone();
            (User::from(u), password_hash)
        }))
    }

    /// Looks up a login identifier against both username and email.
    pub async fn find_by_identifier_with_password(
        &self,
        identifier: &str,
    ) -> Result<Option<(User, String)>> {
        let user = users::Entity::find()
            .filter(Self::active())
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(identifier))
                    .add(users::Column::Email.eq(identifier)),
            )
            .one(&self.conn)
            .await
            .context("Failed to query user by identifier")?;

        Ok(user.map(|u| {
            let password_hash = u.password_hash.clone();
            (User::from(u), password_hash)
        }))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(Self::active())
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(User::from))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(Self::active())
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        Ok(user.map(User::from))
    }

    /// True when another non-deleted user already holds `username`.
    pub async fn username_taken(&self, username: &str, exclude: Option<UserId>) -> Result<bool> {
        let mut query = users::Entity::find()
            .filter(Self::active())
            .filter(users::Column::Username.eq(username));
        if let Some(id) = exclude {
            query = query.filter(users::Column::Id.ne(id.as_uuid()));
        }

        let found = query
            .one(&self.conn)
            .await
            .context("Failed to check username uniqueness")?;
        Ok(found.is_some())
    }

    /// True when another non-deleted user already holds `email`.
    pub async fn email_taken(&self, email: &str, exclude: Option<UserId>) -> Result<bool> {
        let mut query = users::Entity::find()
            .filter(Self::active())
            .filter(users::Column::Email.eq(email));
        if let Some(id) = exclude {
            query = query.filter(users::Column::Id.ne(id.as_uuid()));
        }

        let found = query
            .one(&self.conn)
            .await
            .context("Failed to check email uniqueness")?;
        Ok(found.is_some())
    }

    /// Creates the user, its first password-history row and its role mapping
    /// in one transaction.
    pub async fn create_with_role(&self, new_user: NewUser, role: RoleName) -> Result<User> {
        let now = chrono::Utc::now().to_rfc3339();
        let id = UserId::generate();

        let txn = self.conn.begin().await?;

        let role_row = roles::Entity::find()
            .filter(roles::Column::Name.eq(role.as_str()))
            .one(&txn)
            .await
            .context("Failed to look up role")?
            .ok_or_else(|| anyhow::anyhow!("Role '{role}' has not been seeded"))?;

        let model = users::ActiveModel {
            id: Set(id.as_uuid()),
            username: Set(new_user.username),
            email: Set(new_user.email),
            password_hash: Set(new_user.password_hash.clone()),
            first_name: Set(None),
            last_name: Set(None),
            address: Set(None),
            is_verified: Set(false),
            deleted_at: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
        }
        .insert(&txn)
        .await
        .context("Failed to insert user")?;

        password_history::Entity::insert(password_history::ActiveModel {
            user_id: Set(id.as_uuid()),
            password_hash: Set(new_user.password_hash),
            created_at: Set(now),
            ..Default::default()
        })
        .exec(&txn)
        .await
        .context("Failed to record password history")?;

        user_roles::Entity::insert(user_roles::ActiveModel {
            user_id: Set(id.as_uuid()),
            role_id: Set(role_row.id),
        })
        .exec(&txn)
        .await
        .context("Failed to assign role")?;

        txn.commit().await?;
        Ok(User::from(model))
    }

    /// Stored hashes for a user, newest first. `depth` bounds the window.
    pub async fn password_history(&self, id: UserId, depth: Option<u64>) -> Result<Vec<String>> {
        let mut query = password_history::Entity::find()
            .filter(password_history::Column::UserId.eq(id.as_uuid()))
            .order_by_desc(password_history::Column::Id);
        if let Some(limit) = depth {
            query = query.limit(limit);
        }

        let rows = query
            .all(&self.conn)
            .await
            .context("Failed to load password history")?;
        Ok(rows.into_iter().map(|r| r.password_hash).collect())
    }

    /// Sets a new password hash and appends it to the history atomically.
    pub async fn update_password(&self, id: UserId, new_hash: &str) -> Result<()> {
        let txn = self.conn.begin().await?;
        Self::write_password(&txn, id, new_hash).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Password reset: reset-token removal, new hash and history row commit together.
    ///
    /// Returns `false` without writing anything when the token is already gone.
    pub async fn reset_password(&self, id: UserId, new_hash: &str, token: &str) -> Result<bool> {
        let txn = self.conn.begin().await?;

        let deleted = password_resets::Entity::delete_by_id(token.to_string())
            .exec(&txn)
            .await
            .context("Failed to delete reset token")?;
        if deleted.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        Self::write_password(&txn, id, new_hash).await?;
        txn.commit().await?;
        Ok(true)
    }

    async fn write_password(
        txn: &sea_orm::DatabaseTransaction,
        id: UserId,
        new_hash: &str,
    ) -> Result<()> {
        let user = users::Entity::find_by_id(id.as_uuid())
            .filter(Self::active())
            .one(txn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let now = chrono::Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash.to_string());
        active.updated_at = Set(now.clone());
        active.update(txn).await?;

        password_history::Entity::insert(password_history::ActiveModel {
            user_id: Set(id.as_uuid()),
            password_hash: Set(new_hash.to_string()),
            created_at: Set(now),
            ..Default::default()
        })
        .exec(txn)
        .await
        .context("Failed to record password history")?;

        Ok(())
    }

    pub async fn update_profile(&self, id: UserId, profile: ProfileUpdate) -> Result<User> {
        let user = users::Entity::find_by_id(id.as_uuid())
            .filter(Self::active())
            .one(&self.conn)
            .await
            .context("Failed to query user for profile update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.first_name = Set(Some(profile.first_name));
        active.last_name = Set(Some(profile.last_name));
        active.address = Set(Some(profile.address));
        active.username = Set(profile.username);
        active.email = Set(profile.email);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        let updated = active
            .update(&self.conn)
            .await
            .context("Failed to update profile")?;

        Ok(User::from(updated))
    }
}
