//! `SeaORM` implementation of the [`AuthService`] trait.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

use crate::config::SecurityConfig;
use crate::db::{NewUser, ProfileUpdate, Store, User, is_unique_violation};
use crate::domain::{RoleName, UserId};
use crate::services::auth_service::{
    AuthError, AuthService, LoginResult, ProfileRequest, RegisterRequest,
};
use crate::services::credentials::CredentialStore;
use crate::services::mailer::{Mailer, dispatch};
use crate::services::session::SessionManager;
use crate::services::tokens::TokenService;

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex"))
}

fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

pub struct SeaOrmAuthService {
    store: Store,
    credentials: CredentialStore,
    sessions: Arc<SessionManager>,
    tokens: Arc<TokenService>,
    mailer: Arc<dyn Mailer>,
    security: SecurityConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        credentials: CredentialStore,
        sessions: Arc<SessionManager>,
        tokens: Arc<TokenService>,
        mailer: Arc<dyn Mailer>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            sessions,
            tokens,
            mailer,
            security,
        }
    }

    fn check_length(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < self.security.min_password_length {
            return Err(AuthError::Validation(format!(
                "Please ensure your new password is at least {} characters long",
                self.security.min_password_length
            )));
        }
        Ok(())
    }

    async fn ensure_not_reused(&self, user_id: UserId, password: &str) -> Result<(), AuthError> {
        let history = self
            .store
            .user_repo()
            .password_history(user_id, self.security.password_history_depth)
            .await?;
        if self
            .credentials
            .was_password_used_before(password, &history)
            .await?
        {
            return Err(AuthError::PasswordReused);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(
        &self,
        request: RegisterRequest,
        base_url: &str,
    ) -> Result<User, AuthError> {
        let username = request.username.trim();
        let email = request.email.trim();
        if username.is_empty() || email.is_empty() || request.password.is_empty() {
            return Err(AuthError::Validation("Invalid input".to_string()));
        }
        if !is_valid_email(email) {
            return Err(AuthError::Validation("Invalid email address".to_string()));
        }
        if request.password.chars().count() < self.security.min_password_length {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters long",
                self.security.min_password_length
            )));
        }

        let users = self.store.user_repo();
        if users.username_taken(username, None).await? {
            return Err(AuthError::Conflict("Username already taken".to_string()));
        }
        if users.email_taken(email, None).await? {
            return Err(AuthError::Conflict("Email already taken".to_string()));
        }

        let password_hash = self.credentials.hash_password(&request.password).await?;
        let user = users
            .create_with_role(
                NewUser {
                    username: username.to_string(),
                    email: email.to_string(),
                    password_hash,
                },
                RoleName::User,
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AuthError::Conflict("Username or email already taken".to_string())
                } else {
                    AuthError::from(e)
                }
            })?;

        let token = self.tokens.issue_verification_token(user.id).await?;
        let link = format!("{base_url}/auth/verify?token={token}");
        dispatch(
            self.mailer.clone(),
            user.email.clone(),
            "Verify Your Email".to_string(),
            format!("<p>Welcome, {}!</p><p><a href=\"{link}\">Verify your email</a></p>", user.username),
        );

        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(user)
    }

    async fn login(&self, identifier: &str, password: &str) -> Result<LoginResult, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(AuthError::Validation("Invalid input".to_string()));
        }

        let (user, password_hash) = self
            .store
            .user_repo()
            .find_by_identifier_with_password(identifier)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_verified {
            return Err(AuthError::NotVerified);
        }

        if !self
            .credentials
            .verify_password(&password_hash, password)
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.sessions.create_session(user.id).await?;
        info!(user_id = %user.id, "User logged in");
        Ok(LoginResult { token, user })
    }

    async fn logout(&self, token: &str) {
        self.sessions.destroy_session(token).await;
    }

    async fn verify_email(&self, token: &str) -> Result<UserId, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::InvalidToken);
        }
        let user_id = self.tokens.consume_verification_token(token).await?;
        info!(user_id = %user_id, "Email verified");
        Ok(user_id)
    }

    async fn forgot_password(&self, email: &str, base_url: &str) -> Result<(), AuthError> {
        let email = email.trim();
        let user = self
            .store
            .user_repo()
            .get_by_email(email)
            .await?
            .ok_or(AuthError::EmailNotFound)?;

        let token = self.tokens.issue_reset_token(&user.email).await?;
        let link = format!("{base_url}/auth/reset-password?token={token}");
        dispatch(
            self.mailer.clone(),
            user.email.clone(),
            "Reset your password".to_string(),
            format!("<p><a href=\"{link}\">Reset your password</a></p>"),
        );

        info!(user_id = %user.id, "Password reset requested");
        Ok(())
    }

    async fn check_reset_token(&self, token: &str) -> Result<String, AuthError> {
        Ok(self.tokens.check_reset_token(token).await?)
    }

    async fn reset_password(
        &self,
        token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        if password != confirm_password {
            return Err(AuthError::Validation("Passwords do not match".to_string()));
        }
        self.check_length(password)?;

        let email = self.tokens.check_reset_token(token).await?;
        let user = self
            .store
            .user_repo()
            .get_by_email(&email)
            .await?
            .ok_or_else(|| {
                error!(email = %email, "Reset token points at a missing user");
                AuthError::UserNotFound
            })?;

        self.ensure_not_reused(user.id, password).await?;

        let hash = self.credentials.hash_password(password).await?;
        self.tokens.redeem_reset_token(token, user.id, &hash).await?;

        info!(user_id = %user.id, "Password reset completed");
        Ok(())
    }

    async fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if old_password.is_empty() {
            return Err(AuthError::Validation(
                "The current password you entered is incorrect".to_string(),
            ));
        }
        self.check_length(new_password)?;

        let (_, current_hash) = self
            .store
            .user_repo()
            .get_by_id_with_password(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self
            .credentials
            .verify_password(&current_hash, old_password)
            .await?
        {
            return Err(AuthError::Validation(
                "The current password you entered is incorrect".to_string(),
            ));
        }

        if old_password == new_password {
            return Err(AuthError::Validation(
                "Your new password must be different from your current password".to_string(),
            ));
        }

        self.ensure_not_reused(user_id, new_password).await?;

        let hash = self.credentials.hash_password(new_password).await?;
        self.store
            .user_repo()
            .update_password(user_id, &hash)
            .await?;

        info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    async fn edit_profile(
        &self,
        user_id: UserId,
        session_token: &str,
        request: ProfileRequest,
    ) -> Result<User, AuthError> {
        let update = ProfileUpdate {
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            address: request.address.trim().to_string(),
            username: request.username.trim().to_string(),
            email: request.email.trim().to_string(),
        };
        if update.first_name.is_empty()
            || update.last_name.is_empty()
            || update.address.is_empty()
            || update.username.is_empty()
            || !is_valid_email(&update.email)
        {
            return Err(AuthError::Validation(
                "Invalid input. Please fill all fields correctly.".to_string(),
            ));
        }

        let users = self.store.user_repo();
        if users.username_taken(&update.username, Some(user_id)).await? {
            return Err(AuthError::Conflict("username already exists".to_string()));
        }
        if users.email_taken(&update.email, Some(user_id)).await? {
            return Err(AuthError::Conflict("email already exists".to_string()));
        }

        let user = users.update_profile(user_id, update).await.map_err(|e| {
            if is_unique_violation(&e) {
                AuthError::Conflict("username or email already exists".to_string())
            } else {
                AuthError::from(e)
            }
        })?;

        if let Err(e) = self.sessions.refresh_session(session_token, user_id).await {
            warn!(user_id = %user_id, error = %e, "Session refresh after profile update failed");
        }

        info!(user_id = %user_id, "Profile updated");
        Ok(user)
    }

    async fn grant_admin(&self, username: &str) -> Result<bool, AuthError> {
        let user = self
            .store
            .user_repo()
            .get_by_username(username.trim())
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let granted = self
            .store
            .role_repo()
            .assign(user.id, RoleName::Admin)
            .await?;
        if granted {
            info!(user_id = %user.id, username = %user.username, "Admin role granted");
        }
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::services::clock::{Clock, ManualClock};
    use crate::services::kv::{KeyValueStore, KvError, MemoryKeyValueStore};
    use crate::services::mailer::MailError;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingMailer {
        fn last_link(&self, marker: &str) -> Option<String> {
            let sent = self.sent.lock().unwrap();
            let body = &sent.last()?.2;
            let start = body.find(marker)?;
            let token = &body[start + marker.len()..];
            Some(token.chars().take_while(char::is_ascii_alphanumeric).collect())
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), html_body.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        store: Store,
        sessions: Arc<SessionManager>,
        mailer: Arc<RecordingMailer>,
        service: SeaOrmAuthService,
    }

    fn fast_security() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        }
    }

    /// Session store whose writes always fail.
    struct ReadOnlyKv;

    #[async_trait]
    impl KeyValueStore for ReadOnlyKv {
        async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), KvError> {
            Err(KvError::Unavailable("read-only".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), KvError> {
            Ok(())
        }

        async fn purge_expired(&self) -> Result<u64, KvError> {
            Ok(0)
        }
    }

    async fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        fixture_with_kv(clock.clone(), Arc::new(MemoryKeyValueStore::new(clock))).await
    }

    async fn fixture_with_kv(clock: Arc<dyn Clock>, kv: Arc<dyn KeyValueStore>) -> Fixture {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        store.seed_roles().await.unwrap();
        let sessions = Arc::new(SessionManager::new(kv, Duration::from_secs(3600)));
        let tokens = Arc::new(TokenService::new(
            store.clone(),
            clock,
            TokenConfig::default(),
        ));
        let mailer = Arc::new(RecordingMailer::default());
        let service = SeaOrmAuthService::new(
            store.clone(),
            CredentialStore::new(fast_security()),
            sessions.clone(),
            tokens,
            mailer.clone(),
            fast_security(),
        );
        Fixture {
            store,
            sessions,
            mailer,
            service,
        }
    }

    fn alice() -> RegisterRequest {
        RegisterRequest {
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password: "Secret1".to_string(),
        }
    }

    async fn mail_token(f: &Fixture, marker: &str) -> String {
        for _ in 0..50 {
            if let Some(token) = f.mailer.last_link(marker) {
                return token;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no mail containing {marker}");
    }

    async fn registered_and_verified(f: &Fixture) -> User {
        let user = f.service.register(alice(), "http://localhost").await.unwrap();
        let token = mail_token(f, "/auth/verify?token=").await;
        f.service.verify_email(&token).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_register_verify_login() {
        let f = fixture().await;
        let user = f.service.register(alice(), "http://localhost").await.unwrap();
        assert!(!user.is_verified);

        assert!(matches!(
            f.service.login("alice", "Secret1").await,
            Err(AuthError::NotVerified)
        ));

        let token = mail_token(&f, "/auth/verify?token=").await;
        assert_eq!(f.service.verify_email(&token).await.unwrap(), user.id);
        assert!(matches!(
            f.service.verify_email(&token).await,
            Err(AuthError::InvalidToken)
        ));

        let by_email = f.service.login("alice@x.com", "Secret1").await.unwrap();
        assert_eq!(by_email.user.id, user.id);
        assert_eq!(f.sessions.resolve_session(&by_email.token).await.unwrap(), user.id);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input_and_duplicates() {
        let f = fixture().await;
        let mut bad_email = alice();
        bad_email.email = "not-an-email".to_string();
        assert!(matches!(
            f.service.register(bad_email, "http://x").await,
            Err(AuthError::Validation(_))
        ));

        let mut short = alice();
        short.password = "abc".to_string();
        assert!(matches!(
            f.service.register(short, "http://x").await,
            Err(AuthError::Validation(_))
        ));

        f.service.register(alice(), "http://x").await.unwrap();

        let mut same_name = alice();
        same_name.email = "other@x.com".to_string();
        let err = f.service.register(same_name, "http://x").await.unwrap_err();
        assert_eq!(err.to_string(), "Username already taken");

        let mut same_email = alice();
        same_email.username = "alice2".to_string();
        let err = f.service.register(same_email, "http://x").await.unwrap_err();
        assert_eq!(err.to_string(), "Email already taken");
    }

    #[tokio::test]
    async fn test_wrong_password_issues_no_session() {
        let f = fixture().await;
        registered_and_verified(&f).await;

        let err = f.service.login("alice", "wrong-pass").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
        assert!(matches!(
            f.service.login("nobody", "Secret1").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_change_password_checks_full_history() {
        let f = fixture().await;
        let user = registered_and_verified(&f).await;

        let err = f
            .service
            .change_password(user.id, "nope-nope", "Another1")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "The current password you entered is incorrect");

        let err = f
            .service
            .change_password(user.id, "Secret1", "Secret1")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Your new password must be different from your current password"
        );

        f.service
            .change_password(user.id, "Secret1", "Second2")
            .await
            .unwrap();
        f.service
            .change_password(user.id, "Second2", "Third33")
            .await
            .unwrap();

        // the oldest entry still counts
        assert!(matches!(
            f.service.change_password(user.id, "Third33", "Secret1").await,
            Err(AuthError::PasswordReused)
        ));
        assert!(f.service.login("alice", "Third33").await.is_ok());
        let history = f.store.user_repo().password_history(user.id, None).await.unwrap();
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let f = fixture().await;
        let user = registered_and_verified(&f).await;

        assert!(matches!(
            f.service.forgot_password("ghost@x.com", "http://x").await,
            Err(AuthError::EmailNotFound)
        ));
        f.service
            .forgot_password("alice@x.com", "http://x")
            .await
            .unwrap();
        let token = mail_token(&f, "/auth/reset-password?token=").await;
        assert_eq!(f.service.check_reset_token(&token).await.unwrap(), "alice@x.com");

        let err = f
            .service
            .reset_password(&token, "Fresh12", "Fresh13")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
        assert!(matches!(
            f.service.reset_password(&token, "Secret1", "Secret1").await,
            Err(AuthError::PasswordReused)
        ));

        f.service
            .reset_password(&token, "Fresh12", "Fresh12")
            .await
            .unwrap();
        assert!(matches!(
            f.service.reset_password(&token, "Other12", "Other12").await,
            Err(AuthError::InvalidToken)
        ));
        let login = f.service.login("alice", "Fresh12").await.unwrap();
        assert_eq!(login.user.id, user.id);
    }

    #[tokio::test]
    async fn test_edit_profile_enforces_uniqueness_and_refreshes_session() {
        let f = fixture().await;
        let user = registered_and_verified(&f).await;
        f.service
            .register(
                RegisterRequest {
                    username: "bob".to_string(),
                    email: "bob@x.com".to_string(),
                    password: "Secret1".to_string(),
                },
                "http://x",
            )
            .await
            .unwrap();
        let login = f.service.login("alice", "Secret1").await.unwrap();

        let request = |username: &str, email: &str| ProfileRequest {
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            address: "1 Rabbit Hole".to_string(),
            username: username.to_string(),
            email: email.to_string(),
        };

        let err = f
            .service
            .edit_profile(user.id, &login.token, request("bob", "alice@x.com"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "username already exists");
        let err = f
            .service
            .edit_profile(user.id, &login.token, request("alice", "bob@x.com"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "email already exists");

        let mut missing = request("alice", "alice@x.com");
        missing.address = String::new();
        assert!(matches!(
            f.service.edit_profile(user.id, &login.token, missing).await,
            Err(AuthError::Validation(_))
        ));

        let updated = f
            .service
            .edit_profile(user.id, &login.token, request("alice_l", "alice@x.com"))
            .await
            .unwrap();
        assert_eq!(updated.username, "alice_l");
        assert_eq!(updated.first_name.as_deref(), Some("Alice"));
        assert_eq!(f.sessions.resolve_session(&login.token).await.unwrap(), user.id);
    }

    #[tokio::test]
    async fn test_concurrent_resets_with_one_token_apply_once() {
        let f = fixture().await;
        let user = registered_and_verified(&f).await;
        f.service
            .forgot_password("alice@x.com", "http://x")
            .await
            .unwrap();
        let token = mail_token(&f, "/auth/reset-password?token=").await;

        let (first, second) = tokio::join!(
            f.service.reset_password(&token, "FirstNew1", "FirstNew1"),
            f.service.reset_password(&token, "SecondNew2", "SecondNew2"),
        );
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| matches!(r, Err(AuthError::InvalidToken)))
        );

        let history = f.store.user_repo().password_history(user.id, None).await.unwrap();
        assert_eq!(history.len(), 2);

        assert!(matches!(
            f.service.reset_password(&token, "ThirdNew3", "ThirdNew3").await,
            Err(AuthError::InvalidToken)
        ));
        let history_after = f.store.user_repo().password_history(user.id, None).await.unwrap();
        assert_eq!(history_after, history);
    }

    #[tokio::test]
    async fn test_edit_profile_survives_session_store_failure() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let f = fixture_with_kv(clock, Arc::new(ReadOnlyKv)).await;
        let user = f.service.register(alice(), "http://x").await.unwrap();

        let updated = f
            .service
            .edit_profile(
                user.id,
                "some-session",
                ProfileRequest {
                    first_name: "Alice".to_string(),
                    last_name: "Liddell".to_string(),
                    address: "1 Rabbit Hole".to_string(),
                    username: "alice_l".to_string(),
                    email: "alice@x.com".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username, "alice_l");

        let stored = f.store.user_repo().get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.username, "alice_l");
    }

    #[tokio::test]
    async fn test_grant_admin() {
        let f = fixture().await;
        let user = f.service.register(alice(), "http://x").await.unwrap();

        assert!(f.service.grant_admin("alice").await.unwrap());
        assert!(!f.service.grant_admin("alice").await.unwrap());
        assert!(f.store.role_repo().has_role(user.id, RoleName::Admin).await.unwrap());
        assert!(matches!(
            f.service.grant_admin("nobody").await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let f = fixture().await;
        registered_and_verified(&f).await;
        let login = f.service.login("alice", "Secret1").await.unwrap();

        f.service.logout(&login.token).await;
        f.service.logout(&login.token).await;
        assert!(f.sessions.resolve_session(&login.token).await.is_err());
    }
}
