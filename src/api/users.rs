use axum::{
    Form, Json,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::session::{self, CurrentUser, FLASH_COOKIE};
use super::validation::parse_page;
use super::{
    ApiError, ApiResponse, AppState, ChangePasswordRequest, DashboardQuery, DashboardResponse,
    MessageResponse, ProfileResponse,
};
use crate::services::ProfileRequest;

/// `GET /user/dashboard?page=`
///
/// Consumes the flash cookie, so a message is shown exactly once.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    headers: HeaderMap,
    Query(query): Query<DashboardQuery>,
) -> Result<Response, ApiError> {
    let page = parse_page(query.page.as_deref());
    let listing = state
        .event_service()
        .list_visible_events(&current.actor, page)
        .await?;

    let flash = session::read_encoded_cookie(&headers, FLASH_COOKIE);
    let is_admin = state.shared.policy.is_admin(&current.actor);

    let body = DashboardResponse {
        user: current.actor.user,
        is_admin,
        events: listing.events,
        page: listing.page,
        has_more: listing.has_more,
        next_page: listing.next_page,
        error: query.error.filter(|e| !e.is_empty()),
        flash: flash.clone(),
    };

    let mut response = Json(ApiResponse::success(body)).into_response();
    if flash.is_some() {
        session::append_cookies(&mut response, vec![session::removal_cookie(FLASH_COOKIE)]);
    }
    Ok(response)
}

/// `POST /user/logout`
///
/// Not behind the session guard: a stale or expired cookie is still
/// destroyed and cleared.
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session::read_cookie(&headers, &state.config().session.cookie_name) {
        state.auth_service().logout(&token).await;
    }

    session::redirect("/auth/login", vec![session::clear_session_cookie(&state)])
}

/// `GET /user/profile`
pub async fn profile(current: CurrentUser) -> Json<ApiResponse<ProfileResponse>> {
    Json(ApiResponse::success(ProfileResponse {
        user: current.actor.user,
        message: None,
    }))
}

/// `POST /user/profile`
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Form(request): Form<ProfileRequest>,
) -> Result<Response, ApiError> {
    let user = state
        .auth_service()
        .edit_profile(current.actor.id(), &current.token, request)
        .await?;

    // edit_profile rebinds the token with a fresh TTL
    let cookie = session::session_cookie(&state, current.token);
    let mut response = Json(ApiResponse::success(ProfileResponse {
        user,
        message: Some("Profile updated successfully".to_string()),
    }))
    .into_response();
    session::append_cookies(&mut response, vec![cookie]);
    Ok(response)
}

/// `POST /user/change-password`
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Form(request): Form<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .change_password(
            current.actor.id(),
            &request.old_password,
            &request.new_password,
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Your password has been successfully updated",
    ))))
}
