use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter, QuerySelect,
    RelationTrait, Set,
};

use crate::domain::{RoleName, UserId};
use crate::entities::{roles, user_roles};

pub struct RoleRepository {
    conn: DatabaseConnection,
}

impl RoleRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts any missing role from the fixed set. Returns how many were created.
    pub async fn seed_defaults(&self) -> Result<usize> {
        let mut created = 0;
        for role in RoleName::ALL {
            let existing = roles::Entity::find()
                .filter(roles::Column::Name.eq(role.as_str()))
                .one(&self.conn)
                .await
                .context("Failed to query role")?;

            if existing.is_none() {
                roles::Entity::insert(roles::ActiveModel {
                    name: Set(role.as_str().to_string()),
                    ..Default::default()
                })
                .exec(&self.conn)
                .await
                .with_context(|| format!("Failed to seed role {role}"))?;
                created += 1;
            }
        }
        Ok(created)
    }

    /// Role names held by a user.
    pub async fn names_for_user(&self, user_id: UserId) -> Result<Vec<String>> {
        let names: Vec<String> = roles::Entity::find()
            .select_only()
            .column(roles::Column::Name)
            .join(JoinType::InnerJoin, roles::Relation::UserRoles.def())
            .filter(user_roles::Column::UserId.eq(user_id.as_uuid()))
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to load user roles")?;

        Ok(names)
    }

    pub async fn has_role(&self, user_id: UserId, role: RoleName) -> Result<bool> {
        let found = user_roles::Entity::find()
            .join(JoinType::InnerJoin, user_roles::Relation::Role.def())
            .filter(user_roles::Column::UserId.eq(user_id.as_uuid()))
            .filter(roles::Column::Name.eq(role.as_str()))
            .one(&self.conn)
            .await
            .context("Failed to check user role")?;

        Ok(found.is_some())
    }

    /// Grants `role` unless the user already holds it. Returns whether a row was added.
    pub async fn assign(&self, user_id: UserId, role: RoleName) -> Result<bool> {
        if self.has_role(user_id, role).await? {
            return Ok(false);
        }

        let role_row = roles::Entity::find()
            .filter(roles::Column::Name.eq(role.as_str()))
            .one(&self.conn)
            .await
            .context("Failed to look up role")?
            .ok_or_else(|| anyhow::anyhow!("Role '{role}' has not been seeded"))?;

        user_roles::Entity::insert(user_roles::ActiveModel {
            user_id: Set(user_id.as_uuid()),
            role_id: Set(role_row.id),
        })
        .exec(&self.conn)
        .await
        .context("Failed to assign role")?;

        Ok(true)
    }
}
