use axum::{
    Form, Json,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::session::{self, DASHBOARD_LOCATION};
use super::{
    ApiError, ApiResponse, AppState, ForgotPasswordRequest, LoginRequest, MessageResponse,
    ResetPasswordRequest, ResetTokenResponse, TokenQuery,
};
use crate::services::{AuthError, RegisterRequest};

const REGISTERED_MESSAGE: &str = "User created successfully. A verification email has been sent to your email address. Please verify to complete registration.";
const VERIFIED_MESSAGE: &str = "Your email has been successfully verified. You can now log in.";
const RESET_LINK_MESSAGE: &str = "Reset link sent to your email";

/// `POST /auth/register`
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(request): Form<RegisterRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let base_url = session::base_url(&state, &headers);
    state.auth_service().register(request, &base_url).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        REGISTERED_MESSAGE,
    ))))
}

/// `POST /auth/login`
///
/// Success sets the session cookie and redirects to the dashboard; failures
/// are reported as JSON so the form can show them.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(request): Form<LoginRequest>,
) -> Result<Response, ApiError> {
    let identifier = request.identifier.trim();
    if identifier.is_empty() || request.password.is_empty() {
        return Err(ApiError::validation("Invalid input"));
    }

    let result = state
        .auth_service()
        .login(identifier, &request.password)
        .await?;

    let cookie = session::session_cookie(&state, result.token);
    Ok(session::redirect(DASHBOARD_LOCATION, vec![cookie]))
}

/// `GET /auth/verify?token=`
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return Err(ApiError::validation("Invalid verification token"));
    };

    match state.auth_service().verify_email(&token).await {
        Ok(_) => Ok(Json(ApiResponse::success(MessageResponse::new(
            VERIFIED_MESSAGE,
        )))),
        Err(AuthError::InvalidToken) => Err(ApiError::validation(
            "Invalid or expired verification token",
        )),
        Err(e) => Err(e.into()),
    }
}

/// `POST /auth/forgot-password`
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(request): Form<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let email = request.email.trim();
    if email.is_empty() {
        return Err(ApiError::validation("Invalid input"));
    }

    let base_url = session::base_url(&state, &headers);
    state.auth_service().forgot_password(email, &base_url).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        RESET_LINK_MESSAGE,
    ))))
}

/// `GET /auth/reset-password?token=`
///
/// A usable token is echoed back for the reset form; anything else goes to
/// the login page.
pub async fn reset_password_form(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Response {
    let token = query.token.unwrap_or_default();

    match state.auth_service().check_reset_token(&token).await {
        Ok(_) => Json(ApiResponse::success(ResetTokenResponse { token })).into_response(),
        Err(AuthError::InvalidToken) => {
            session::redirect("/auth/login?error=invalid_token", Vec::new())
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// `POST /auth/reset-password`
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Form(request): Form<ResetPasswordRequest>,
) -> Response {
    let result = state
        .auth_service()
        .reset_password(
            &request.token,
            &request.password,
            &request.confirm_password,
        )
        .await;

    match result {
        Ok(()) => session::redirect("/auth/login?success=password_reset", Vec::new()),
        Err(AuthError::InvalidToken) => {
            session::redirect("/auth/login?error=invalid_reset_token", Vec::new())
        }
        Err(AuthError::UserNotFound) => {
            session::redirect("/auth/login?error=user_not_found", Vec::new())
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
