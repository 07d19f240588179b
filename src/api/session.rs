//! Cookie plumbing and the request-scoped identity extractor.
//!
//! Three cookies are in play: the session token, a one-shot `flash` message
//! shown on the next dashboard render, and `form_data` holding a rejected
//! event form so it can be re-populated.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_sessions::cookie::{Cookie, SameSite};

use super::AppState;
use crate::services::Actor;

pub const FLASH_COOKIE: &str = "flash";
pub const FORM_DATA_COOKIE: &str = "form_data";
const SHORT_COOKIE_SECONDS: i64 = 300;

pub const LOGIN_REQUIRED_LOCATION: &str = "/auth/login?error=auth_required";
pub const DASHBOARD_LOCATION: &str = "/user/dashboard";

/// The authenticated user for this request.
///
/// Handlers that take a `CurrentUser` never run for anonymous requests;
/// extraction fails with a redirect to the login page instead.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub actor: Actor,
    pub token: String,
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let cookie_name = &state.config().session.cookie_name;
        let Some(token) = read_cookie(&parts.headers, cookie_name) else {
            return Err(redirect(LOGIN_REQUIRED_LOCATION, Vec::new()));
        };

        match state.shared.identity.current_user(Some(&token)).await {
            Some(actor) => {
                tracing::Span::current().record("user_id", tracing::field::display(actor.id()));
                Ok(Self { actor, token })
            }
            None => Err(redirect(LOGIN_REQUIRED_LOCATION, Vec::new())),
        }
    }
}

/// Sends already-authenticated visitors of the guest pages to the dashboard.
pub async fn guest_only_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let token = read_cookie(request.headers(), &state.config().session.cookie_name);
    if let Some(token) = token
        && state
            .shared
            .identity
            .current_user(Some(&token))
            .await
            .is_some()
    {
        return redirect(DASHBOARD_LOCATION, Vec::new());
    }

    next.run(request).await
}

/// A `302 Found` carrying any number of `Set-Cookie` headers.
pub fn redirect(location: &str, cookies: Vec<Cookie<'static>>) -> Response {
    let mut response = (StatusCode::FOUND, [(header::LOCATION, location.to_string())])
        .into_response();
    append_cookies(&mut response, cookies);
    response
}

/// Redirect to `path` with `message` in the `error` query parameter.
pub fn redirect_with_error(path: &str, message: &str, cookies: Vec<Cookie<'static>>) -> Response {
    let separator = if path.contains('?') { '&' } else { '?' };
    let location = format!("{path}{separator}error={}", urlencoding::encode(message));
    redirect(&location, cookies)
}

pub fn append_cookies(response: &mut Response, cookies: Vec<Cookie<'static>>) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(cookie = cookie.name(), error = %e, "Dropping unencodable cookie"),
        }
    }
}

/// Raw value of the named cookie, if the request carries a non-empty one.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Like [`read_cookie`] for values written by [`short_lived_cookie`].
#[must_use]
pub fn read_encoded_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    read_cookie(headers, name)
        .and_then(|raw| urlencoding::decode(&raw).ok().map(|value| value.into_owned()))
}

#[must_use]
pub fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let config = state.config();
    let max_age = i64::try_from(config.session.ttl_seconds).unwrap_or(i64::MAX);
    Cookie::build((config.session.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.server.secure_cookies)
        .max_age(time::Duration::seconds(max_age))
        .build()
}

#[must_use]
pub fn clear_session_cookie(state: &AppState) -> Cookie<'static> {
    removal_cookie(state.config().session.cookie_name.clone())
}

/// An HttpOnly cookie that lives for five minutes; the value is
/// percent-encoded.
#[must_use]
pub fn short_lived_cookie(name: &'static str, value: &str) -> Cookie<'static> {
    Cookie::build((name, urlencoding::encode(value).into_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(SHORT_COOKIE_SECONDS))
        .build()
}

#[must_use]
pub fn removal_cookie(name: impl Into<String>) -> Cookie<'static> {
    Cookie::build((name.into(), String::new()))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::ZERO)
        .build()
}

/// Absolute origin used in mailed links: the configured public URL, or the
/// request's host and forwarded scheme.
#[must_use]
pub fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(public_url) = state.config().server.public_url.as_deref() {
        return public_url.trim_end_matches('/').to_string();
    }

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");

    format!("{scheme}://{host}")
}
