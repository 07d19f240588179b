use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Store;
use crate::services::uploads::UPLOADS_URL_PREFIX;
use crate::services::{AuthService, EventService};
use crate::state::SharedState;

pub mod auth;
mod error;
pub mod events;
mod observability;
pub mod session;
mod system;
mod types;
pub mod users;
mod validation;

pub use error::ApiError;
pub use session::CurrentUser;
pub use types::*;

/// Room for the text fields sent alongside an image upload.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn event_service(&self) -> &Arc<dyn EventService> {
        &self.shared.event_service
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    let uploads_root = state.shared.uploads.root().to_path_buf();
    let static_path = state.config().server.static_path.clone();
    let body_limit = state.shared.uploads.max_bytes() + FORM_OVERHEAD_BYTES;

    let guest_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/verify", get(auth::verify_email))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route(
            "/auth/reset-password",
            get(auth::reset_password_form).post(auth::reset_password),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::guest_only_middleware,
        ));

    // session-guarded through the CurrentUser extractor
    let user_routes = Router::new()
        .route("/user/dashboard", get(users::dashboard))
        .route("/user/logout", post(users::logout))
        .route(
            "/user/profile",
            get(users::profile).post(users::update_profile),
        )
        .route("/user/change-password", post(users::change_password));

    let event_routes = Router::new()
        .route("/events/new", get(events::new_event))
        .route("/events/create", post(events::create_event))
        .route("/events/{id}", get(events::get_event))
        .route("/events/edit/{id}", get(events::edit_event))
        .route("/events/update/{id}", post(events::update_event))
        .route("/events/delete/{id}", post(events::delete_event))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .merge(guest_routes)
        .merge(user_routes)
        .merge(event_routes)
        .route("/health", get(system::health))
        .route("/metrics", get(observability::get_metrics))
        .with_state(state)
        .nest_service(UPLOADS_URL_PREFIX, ServeDir::new(uploads_root))
        .nest_service("/static", ServeDir::new(static_path))
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(TraceLayer::new_for_http())
}
