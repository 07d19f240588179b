//! Turns a session token into the sanitized [`Actor`] for a request.

use std::sync::Arc;
use tracing::{debug, error};

use crate::db::Store;
use crate::services::policy::{Actor, AuthorizationPolicy};
use crate::services::session::{SessionError, SessionManager};

pub struct IdentityResolver {
    sessions: Arc<SessionManager>,
    store: Store,
    policy: AuthorizationPolicy,
}

impl IdentityResolver {
    #[must_use]
    pub const fn new(
        sessions: Arc<SessionManager>,
        store: Store,
        policy: AuthorizationPolicy,
    ) -> Self {
        Self {
            sessions,
            store,
            policy,
        }
    }

    /// `None` means unauthenticated: missing token, expired or unknown
    /// session, deleted user, or a store failure (logged).
    pub async fn current_user(&self, token: Option<&str>) -> Option<Actor> {
        let token = token.filter(|t| !t.is_empty())?;

        let user_id = match self.sessions.resolve_session(token).await {
            Ok(id) => id,
            Err(SessionError::NotFound) => return None,
            Err(e) => {
                error!(error = %e, "Session lookup failed");
                return None;
            }
        };

        let user = match self.store.user_repo().get_by_id(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!(user_id = %user_id, "Session points at a missing user");
                return None;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to load session user");
                return None;
            }
        };

        match self.policy.actor_for(user).await {
            Ok(actor) => Some(actor),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to load user roles");
                None
            }
        }
    }
}
