//! Domain service for accounts: registration, login, email verification,
//! password reset and change, and profile edits.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::User;
use crate::domain::UserId;
use crate::services::credentials::CredentialError;
use crate::services::session::SessionError;
use crate::services::tokens::TokenError;

/// Errors specific to account operations.
///
/// `Display` strings for the user-correctable variants are shown verbatim.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Please verify your email before logging in.")]
    NotVerified,

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Email not found")]
    EmailNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("This password has been used recently. Please choose a different password")]
    PasswordReused,

    #[error("Session error: {0}")]
    Session(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<CredentialError> for AuthError {
    fn from(err: CredentialError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        Self::Session(err.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken => Self::InvalidToken,
            TokenError::Storage(message) => Self::Storage(message),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileRequest {
    #[serde(default, alias = "firstName")]
    pub first_name: String,
    #[serde(default, alias = "lastName")]
    pub last_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// A fresh session for a user who just logged in.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub user: User,
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates an unverified account with the `user` role and mails a
    /// verification link rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] for missing fields, a bad email or a short password
    /// - [`AuthError::Conflict`] if the username or email is taken
    async fn register(&self, request: RegisterRequest, base_url: &str)
    -> Result<User, AuthError>;

    /// `identifier` matches either the username or the email.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredentials`] for an unknown identifier or wrong password
    /// - [`AuthError::NotVerified`] if the email has not been verified
    async fn login(&self, identifier: &str, password: &str) -> Result<LoginResult, AuthError>;

    /// Always succeeds; store failures are logged.
    async fn logout(&self, token: &str);

    async fn verify_email(&self, token: &str) -> Result<UserId, AuthError>;

    async fn forgot_password(&self, email: &str, base_url: &str) -> Result<(), AuthError>;

    /// Email the reset token belongs to; the token stays usable.
    async fn check_reset_token(&self, token: &str) -> Result<String, AuthError>;

    async fn reset_password(
        &self,
        token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError>;

    async fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;

    /// Updates the profile, then rebinds `session_token` with a fresh TTL.
    async fn edit_profile(
        &self,
        user_id: UserId,
        session_token: &str,
        request: ProfileRequest,
    ) -> Result<User, AuthError>;

    /// Returns `false` if the user was already an admin.
    async fn grant_admin(&self, username: &str) -> Result<bool, AuthError>;
}
