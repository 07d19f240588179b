//! Domain service for the event lifecycle.
//!
//! Events move `draft -> published -> expired` (drafts may also expire
//! directly). Mutations are restricted to the creator or an admin, and every
//! operation takes the acting [`Actor`] explicitly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::SweepCounts;
use crate::domain::{EVENT_DATETIME_FORMAT, EventId, EventStatus, UserId};
use crate::entities::events;
use crate::services::policy::Actor;

/// Domain errors for event operations.
///
/// `Display` strings are user-facing and are shown verbatim on redirects.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidDateTime(String),

    #[error("End datetime must be after start datetime")]
    InvalidTimeRange,

    #[error("Event title must be unique")]
    Conflict,

    #[error("Event not found")]
    NotFound,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Failed to upload image")]
    Upload(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sea_orm::DbErr> for EventError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for EventError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// An uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Submitted event form. Times are `YYYY-MM-DDTHH:MM` strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(skip)]
    pub image: Option<UploadedImage>,
}

/// An event as shown to one particular actor.
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
    pub image: Option<String>,
    pub status: EventStatus,
    pub created_by: UserId,
    pub published_date: Option<String>,
    /// Whether the viewing actor may edit or delete it. Never stored.
    pub is_editable: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl EventView {
    #[must_use]
    pub fn from_model(model: events::Model, is_editable: bool) -> Self {
        Self {
            id: EventId::from_uuid(model.id),
            title: model.title,
            description: model.description,
            start_time: model.start_time.format(EVENT_DATETIME_FORMAT).to_string(),
            end_time: model.end_time.format(EVENT_DATETIME_FORMAT).to_string(),
            location: model.location,
            image: model.image,
            status: model.status,
            created_by: UserId::from_uuid(model.created_by),
            published_date: model
                .published_date
                .map(|d| d.format(EVENT_DATETIME_FORMAT).to_string()),
            is_editable,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// One dashboard page.
#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    pub events: Vec<EventView>,
    pub page: u64,
    pub has_more: bool,
    pub next_page: u64,
}

#[async_trait::async_trait]
pub trait EventService: Send + Sync {
    /// Validates `input` and stores a new event owned by `actor`.
    ///
    /// # Errors
    ///
    /// - [`EventError::Validation`] for missing fields or an unknown status
    /// - [`EventError::Conflict`] if a live event already has the title
    /// - [`EventError::InvalidDateTime`] / [`EventError::InvalidTimeRange`] for bad times
    /// - [`EventError::Upload`] if the image cannot be stored
    async fn create_event(&self, input: EventInput, actor: &Actor)
    -> Result<EventView, EventError>;

    /// Same rules as creation, plus owner-or-admin. A new image replaces the old file.
    async fn update_event(
        &self,
        id: EventId,
        input: EventInput,
        actor: &Actor,
    ) -> Result<EventView, EventError>;

    /// Soft delete; owner-or-admin only.
    async fn delete_event(&self, id: EventId, actor: &Actor) -> Result<(), EventError>;

    /// Any live event, annotated with the actor's edit rights.
    async fn get_event(&self, id: EventId, actor: &Actor) -> Result<EventView, EventError>;

    /// Like [`Self::get_event`] but fails with [`EventError::PermissionDenied`]
    /// unless the actor may edit it.
    async fn get_event_for_edit(&self, id: EventId, actor: &Actor)
    -> Result<EventView, EventError>;

    /// Newest first; `page` is 1-based and clamped to at least 1.
    async fn list_visible_events(&self, actor: &Actor, page: u64)
    -> Result<EventPage, EventError>;

    /// Runs one publish/expire pass against the service clock.
    async fn sweep_statuses(&self) -> Result<SweepCounts, EventError>;
}
