use axum::{
    Form, Json,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::session::{
    self, CurrentUser, DASHBOARD_LOCATION, FLASH_COOKIE, FORM_DATA_COOKIE,
};
use super::validation::validate_event_id;
use super::{ApiError, ApiResponse, AppState, EventFormResponse, NoticeQuery};
use crate::domain::{EventId, EventStatus};
use crate::services::{EventError, EventInput, EventView, UploadedImage};

/// An event form submitted either as `multipart/form-data` (with an optional
/// `image` file part) or as a urlencoded body.
pub struct EventForm(pub EventInput);

impl FromRequest<Arc<AppState>> for EventForm {
    type Rejection = Response;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            read_multipart(multipart)
                .await
                .map(Self)
                .map_err(IntoResponse::into_response)
        } else {
            let Form(input) = Form::<EventInput>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(input))
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<EventInput, ApiError> {
    let mut input = EventInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed form data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "image" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::validation(format!("Malformed image upload: {e}")))?;
            // browsers send an empty part when no file was chosen
            if !filename.is_empty() && !bytes.is_empty() {
                input.image = Some(UploadedImage {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::validation(format!("Malformed form data: {e}")))?;
        match name.as_str() {
            "title" => input.title = value,
            "description" => input.description = value,
            "start_time" => input.start_time = value,
            "end_time" => input.end_time = value,
            "location" => input.location = value,
            "status" => input.status = value,
            "published_date" => input.published_date = Some(value),
            _ => {}
        }
    }

    Ok(input)
}

/// Message shown to the user for a failed create or update. Storage details
/// stay in the logs.
fn user_message(err: &EventError, fallback: &str) -> String {
    match err {
        EventError::Storage(msg) => {
            tracing::error!(error = %msg, "Event write failed");
            fallback.to_string()
        }
        EventError::Upload(msg) => {
            tracing::warn!(error = %msg, "Event image upload failed");
            err.to_string()
        }
        _ => err.to_string(),
    }
}

fn form_data_cookie(input: &EventInput) -> Option<tower_sessions::cookie::Cookie<'static>> {
    match serde_json::to_string(input) {
        Ok(json) => Some(session::short_lived_cookie(FORM_DATA_COOKIE, &json)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize form data");
            None
        }
    }
}

fn success_redirect(message: &str) -> Response {
    session::redirect(
        DASHBOARD_LOCATION,
        vec![session::short_lived_cookie(FLASH_COOKIE, message)],
    )
}

/// Redirect for an event that cannot be touched: gone, or not the actor's.
fn dashboard_error(err: &EventError) -> Option<Response> {
    match err {
        EventError::NotFound | EventError::PermissionDenied => Some(
            session::redirect_with_error(DASHBOARD_LOCATION, &err.to_string(), Vec::new()),
        ),
        _ => None,
    }
}

/// `GET /events/new`
///
/// Re-populates the form from the `form_data` cookie left by a rejected
/// submission, then clears it.
pub async fn new_event(
    _current: CurrentUser,
    headers: HeaderMap,
    Query(query): Query<NoticeQuery>,
) -> Response {
    let saved = session::read_encoded_cookie(&headers, FORM_DATA_COOKIE);
    let mut form = saved
        .as_deref()
        .and_then(|json| serde_json::from_str::<EventInput>(json).ok())
        .unwrap_or_default();
    if form.status.is_empty() {
        form.status = EventStatus::Draft.as_str().to_string();
    }

    let mut response = Json(ApiResponse::success(EventFormResponse {
        form,
        event_id: None,
        image: None,
        error: query.error.filter(|e| !e.is_empty()),
    }))
    .into_response();

    if saved.is_some() {
        session::append_cookies(&mut response, vec![session::removal_cookie(FORM_DATA_COOKIE)]);
    }
    response
}

/// `POST /events/create`
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    EventForm(input): EventForm,
) -> Response {
    // the image part cannot be replayed, everything else can
    let cookie = form_data_cookie(&input);

    match state.event_service().create_event(input, &current.actor).await {
        Ok(_) => success_redirect("Event created successfully"),
        Err(e) => {
            let message = user_message(&e, "Failed to create event");
            session::redirect_with_error(
                "/events/new",
                &message,
                cookie.into_iter().collect(),
            )
        }
    }
}

/// `GET /events/{id}`
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<EventView>>, ApiError> {
    let id = validate_event_id(&id)?;
    let event = state.event_service().get_event(id, &current.actor).await?;
    Ok(Json(ApiResponse::success(event)))
}

/// `GET /events/edit/{id}`
pub async fn edit_event(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<NoticeQuery>,
) -> Response {
    let Ok(id) = id.parse::<EventId>() else {
        return session::redirect_with_error(DASHBOARD_LOCATION, "Event not found", Vec::new());
    };

    match state
        .event_service()
        .get_event_for_edit(id, &current.actor)
        .await
    {
        Ok(event) => {
            let form = EventInput {
                title: event.title,
                description: event.description,
                start_time: event.start_time,
                end_time: event.end_time,
                location: event.location,
                status: event.status.as_str().to_string(),
                published_date: event.published_date,
                image: None,
            };
            Json(ApiResponse::success(EventFormResponse {
                form,
                event_id: Some(event.id.to_string()),
                image: event.image,
                error: query.error.filter(|e| !e.is_empty()),
            }))
            .into_response()
        }
        Err(e) => dashboard_error(&e).unwrap_or_else(|| ApiError::from(e).into_response()),
    }
}

/// `POST /events/update/{id}`
pub async fn update_event(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    EventForm(input): EventForm,
) -> Response {
    let Ok(event_id) = id.parse::<EventId>() else {
        return session::redirect_with_error(DASHBOARD_LOCATION, "Event not found", Vec::new());
    };

    match state
        .event_service()
        .update_event(event_id, input, &current.actor)
        .await
    {
        Ok(_) => success_redirect("Event updated successfully"),
        Err(e) => dashboard_error(&e).unwrap_or_else(|| {
            let message = user_message(&e, "Failed to update event");
            session::redirect_with_error(&format!("/events/edit/{event_id}"), &message, Vec::new())
        }),
    }
}

/// `POST /events/delete/{id}`
pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Response {
    let Ok(event_id) = id.parse::<EventId>() else {
        return session::redirect_with_error(DASHBOARD_LOCATION, "Event not found", Vec::new());
    };

    match state
        .event_service()
        .delete_event(event_id, &current.actor)
        .await
    {
        Ok(()) => success_redirect("Event deleted successfully"),
        Err(e) => dashboard_error(&e).unwrap_or_else(|| {
            let message = user_message(&e, "Failed to delete event");
            session::redirect_with_error(DASHBOARD_LOCATION, &message, Vec::new())
        }),
    }
}
