//! Every role-based decision lives here: admin checks, owner-or-admin
//! mutation rights and listing visibility.

use anyhow::Result;
use serde::Serialize;

use crate::db::{EventScope, Store, User};
use crate::domain::{RoleName, UserId};

/// The authenticated user behind a request, with roles resolved once.
#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub user: User,
    pub roles: Vec<String>,
}

impl Actor {
    #[must_use]
    pub const fn new(user: User, roles: Vec<String>) -> Self {
        Self { user, roles }
    }

    #[must_use]
    pub const fn id(&self) -> UserId {
        self.user.id
    }

    #[must_use]
    pub fn has_role(&self, role: RoleName) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }
}

#[derive(Clone)]
pub struct AuthorizationPolicy {
    store: Store,
}

impl AuthorizationPolicy {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Loads the roles for `user` and wraps both as an [`Actor`].
    pub async fn actor_for(&self, user: User) -> Result<Actor> {
        let roles = self.store.role_repo().names_for_user(user.id).await?;
        Ok(Actor::new(user, roles))
    }

    #[must_use]
    pub fn is_admin(&self, actor: &Actor) -> bool {
        actor.has_role(RoleName::Admin)
    }

    #[must_use]
    pub fn is_owner_or_admin(&self, actor: &Actor, created_by: UserId) -> bool {
        created_by == actor.id() || self.is_admin(actor)
    }

    /// Edit and delete rights on an event; same rule as [`Self::is_owner_or_admin`].
    #[must_use]
    pub fn can_edit(&self, actor: &Actor, created_by: UserId) -> bool {
        self.is_owner_or_admin(actor, created_by)
    }

    /// Admins list everything; others see published events and their own.
    #[must_use]
    pub fn listing_scope(&self, actor: &Actor) -> EventScope {
        if self.is_admin(actor) {
            EventScope::All
        } else {
            EventScope::PublishedOrOwnedBy(actor.id())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: UserId) -> User {
        User {
            id,
            username: "u".to_string(),
            email: "u@x.com".to_string(),
            first_name: None,
            last_name: None,
            address: None,
            is_verified: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    async fn policy() -> AuthorizationPolicy {
        AuthorizationPolicy::new(
            Store::with_pool_options("sqlite::memory:", 1, 1)
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_owner_or_admin() {
        let policy = policy().await;
        let owner = UserId::generate();
        let other = UserId::generate();

        let owner_actor = Actor::new(user(owner), vec!["user".to_string()]);
        let other_actor = Actor::new(user(other), vec!["user".to_string()]);
        let admin_actor = Actor::new(
            user(UserId::generate()),
            vec!["user".to_string(), "admin".to_string()],
        );

        assert!(policy.can_edit(&owner_actor, owner));
        assert!(!policy.can_edit(&other_actor, owner));
        assert!(policy.can_edit(&admin_actor, owner));
    }

    #[tokio::test]
    async fn test_listing_scope() {
        let policy = policy().await;
        let id = UserId::generate();
        let plain = Actor::new(user(id), vec!["user".to_string()]);
        let moderator = Actor::new(user(id), vec!["moderator".to_string()]);
        let admin = Actor::new(user(id), vec!["admin".to_string()]);

        assert_eq!(policy.listing_scope(&plain), EventScope::PublishedOrOwnedBy(id));
        assert_eq!(policy.listing_scope(&moderator), EventScope::PublishedOrOwnedBy(id));
        assert_eq!(policy.listing_scope(&admin), EventScope::All);
    }
}
