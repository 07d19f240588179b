//! `SeaORM` implementation of the [`EventService`] trait.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sea_orm::{ActiveValue::Set, IntoActiveModel};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EventsConfig;
use crate::db::{Store, SweepCounts, is_unique_violation};
use crate::domain::{EventId, EventStatus, UserId, parse_event_datetime};
use crate::entities::events;
use crate::services::clock::Clock;
use crate::services::event_service::{
    EventError, EventInput, EventPage, EventService, EventView, UploadedImage,
};
use crate::services::policy::{Actor, AuthorizationPolicy};
use crate::services::uploads::UploadStore;

const REQUIRED_FIELDS_MESSAGE: &str = "Please fill all required fields correctly";

/// Form input that passed every check except image storage.
struct ValidatedEvent {
    title: String,
    description: String,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    location: String,
    status: EventStatus,
    explicit_publish_date: Option<NaiveDateTime>,
}

pub struct SeaOrmEventService {
    store: Store,
    policy: AuthorizationPolicy,
    uploads: UploadStore,
    clock: Arc<dyn Clock>,
    config: EventsConfig,
}

impl SeaOrmEventService {
    #[must_use]
    pub fn new(
        store: Store,
        policy: AuthorizationPolicy,
        uploads: UploadStore,
        clock: Arc<dyn Clock>,
        config: EventsConfig,
    ) -> Self {
        Self {
            store,
            policy,
            uploads,
            clock,
            config,
        }
    }

    /// Checks run in a fixed order so the first failure reported matches
    /// what the user would fix first.
    async fn validate(
        &self,
        input: &EventInput,
        exclude: Option<EventId>,
    ) -> Result<ValidatedEvent, EventError> {
        let title = input.title.trim();
        let location = input.location.trim();
        let status = EventStatus::parse_submitted(&input.status);

        if title.is_empty()
            || input.description.trim().is_empty()
            || input.start_time.trim().is_empty()
            || input.end_time.trim().is_empty()
            || location.is_empty()
        {
            return Err(EventError::Validation(REQUIRED_FIELDS_MESSAGE.to_string()));
        }
        let Some(status) = status else {
            return Err(EventError::Validation(REQUIRED_FIELDS_MESSAGE.to_string()));
        };

        if self.store.event_repo().title_exists(title, exclude).await? {
            return Err(EventError::Conflict);
        }

        let start_time = parse_event_datetime(&input.start_time).ok_or_else(|| {
            EventError::InvalidDateTime("Invalid start datetime format".to_string())
        })?;
        let end_time = parse_event_datetime(&input.end_time).ok_or_else(|| {
            EventError::InvalidDateTime("Invalid end datetime format".to_string())
        })?;
        if end_time < start_time {
            return Err(EventError::InvalidTimeRange);
        }

        let explicit_publish_date = match (status, input.published_date.as_deref()) {
            (EventStatus::Draft, Some(raw)) if !raw.trim().is_empty() => {
                Some(parse_event_datetime(raw).ok_or_else(|| {
                    EventError::InvalidDateTime("Invalid published date format".to_string())
                })?)
            }
            _ => None,
        };

        Ok(ValidatedEvent {
            title: title.to_string(),
            description: input.description.clone(),
            start_time,
            end_time,
            location: location.to_string(),
            status,
            explicit_publish_date,
        })
    }

    async fn store_image(
        &self,
        image: Option<&UploadedImage>,
    ) -> Result<Option<String>, EventError> {
        let Some(image) = image.filter(|i| !i.bytes.is_empty()) else {
            return Ok(None);
        };
        self.uploads
            .save_event_image(&image.filename, &image.bytes)
            .await
            .map(Some)
            .map_err(|e| {
                warn!(error = %e, "Event image upload failed");
                EventError::Upload(e.to_string())
            })
    }

    async fn load(&self, id: EventId) -> Result<events::Model, EventError> {
        self.store
            .event_repo()
            .get(id)
            .await?
            .ok_or(EventError::NotFound)
    }

    fn view(&self, model: events::Model, actor: &Actor) -> EventView {
        let editable = self
            .policy
            .can_edit(actor, UserId::from_uuid(model.created_by));
        EventView::from_model(model, editable)
    }

    fn preview(&self, description: &str) -> String {
        let limit = self.config.description_preview_length;
        if description.chars().count() > limit {
            let mut short: String = description.chars().take(limit).collect();
            short.push_str("...");
            short
        } else {
            description.to_string()
        }
    }
}

fn map_write_error(err: anyhow::Error) -> EventError {
    if is_unique_violation(&err) {
        EventError::Conflict
    } else {
        EventError::Storage(err.to_string())
    }
}

#[async_trait]
impl EventService for SeaOrmEventService {
    async fn create_event(
        &self,
        input: EventInput,
        actor: &Actor,
    ) -> Result<EventView, EventError> {
        let valid = self.validate(&input, None).await?;

        let published_date = match valid.status {
            EventStatus::Published => Some(self.clock.now_local()),
            _ => valid.explicit_publish_date,
        };

        let image = self.store_image(input.image.as_ref()).await?;

        let now = self.clock.now_utc().to_rfc3339();
        let model = events::ActiveModel {
            id: Set(EventId::generate().as_uuid()),
            title: Set(valid.title),
            description: Set(valid.description),
            start_time: Set(valid.start_time),
            end_time: Set(valid.end_time),
            location: Set(valid.location),
            image: Set(image),
            status: Set(valid.status),
            created_by: Set(actor.id().as_uuid()),
            published_date: Set(published_date),
            deleted_at: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };

        let created = self
            .store
            .event_repo()
            .insert(model)
            .await
            .map_err(map_write_error)?;

        info!(event_id = %created.id, user_id = %actor.id(), status = %created.status, "Event created");
        Ok(self.view(created, actor))
    }

    async fn update_event(
        &self,
        id: EventId,
        input: EventInput,
        actor: &Actor,
    ) -> Result<EventView, EventError> {
        let existing = self.load(id).await?;
        if !self
            .policy
            .can_edit(actor, UserId::from_uuid(existing.created_by))
        {
            return Err(EventError::PermissionDenied);
        }

        let valid = self.validate(&input, Some(id)).await?;

        // nothing leaves expired; re-publishing keeps the original publish date
        let (status, published_date) = match (existing.status, valid.status) {
            (EventStatus::Expired, _) => (EventStatus::Expired, existing.published_date),
            (EventStatus::Published, EventStatus::Published) => (
                EventStatus::Published,
                existing
                    .published_date
                    .or_else(|| Some(self.clock.now_local())),
            ),
            (_, EventStatus::Published) => {
                (EventStatus::Published, Some(self.clock.now_local()))
            }
            (_, status) => (status, valid.explicit_publish_date),
        };

        let has_new_image = input.image.as_ref().is_some_and(|i| !i.bytes.is_empty());
        let previous_image = existing.image.clone();
        let image = if has_new_image {
            self.store_image(input.image.as_ref()).await?
        } else {
            previous_image.clone()
        };

        let mut model = existing.into_active_model();
        model.title = Set(valid.title);
        model.description = Set(valid.description);
        model.start_time = Set(valid.start_time);
        model.end_time = Set(valid.end_time);
        model.location = Set(valid.location);
        model.image = Set(image.clone());
        model.status = Set(status);
        model.published_date = Set(published_date);
        model.updated_at = Set(self.clock.now_utc().to_rfc3339());

        let updated = match self.store.event_repo().update(model).await {
            Ok(updated) => updated,
            Err(e) => {
                if has_new_image && let Some(new) = image.as_deref() {
                    self.uploads.delete_reference(new).await;
                }
                return Err(map_write_error(e));
            }
        };

        // the old file goes only once the row points at the new one
        if has_new_image && let Some(old) = previous_image.as_deref() {
            self.uploads.delete_reference(old).await;
        }

        info!(event_id = %id, user_id = %actor.id(), status = %updated.status, "Event updated");
        Ok(self.view(updated, actor))
    }

    async fn delete_event(&self, id: EventId, actor: &Actor) -> Result<(), EventError> {
        let existing = self.load(id).await?;
        if !self
            .policy
            .can_edit(actor, UserId::from_uuid(existing.created_by))
        {
            return Err(EventError::PermissionDenied);
        }

        if !self.store.event_repo().soft_delete(id).await? {
            return Err(EventError::NotFound);
        }

        info!(event_id = %id, user_id = %actor.id(), "Event deleted");
        Ok(())
    }

    async fn get_event(&self, id: EventId, actor: &Actor) -> Result<EventView, EventError> {
        let model = self.load(id).await?;
        Ok(self.view(model, actor))
    }

    async fn get_event_for_edit(
        &self,
        id: EventId,
        actor: &Actor,
    ) -> Result<EventView, EventError> {
        let view = self.get_event(id, actor).await?;
        if view.is_editable {
            Ok(view)
        } else {
            Err(EventError::PermissionDenied)
        }
    }

    async fn list_visible_events(
        &self,
        actor: &Actor,
        page: u64,
    ) -> Result<EventPage, EventError> {
        let page = page.max(1);
        let page_size = self.config.page_size;
        let offset = (page - 1).saturating_mul(page_size);

        let scope = self.policy.listing_scope(actor);
        let (rows, total) = self.store.event_repo().list(scope, offset, page_size).await?;

        let events = rows
            .into_iter()
            .map(|model| {
                let mut view = self.view(model, actor);
                view.description = self.preview(&view.description);
                view
            })
            .collect();

        Ok(EventPage {
            events,
            page,
            has_more: offset.saturating_add(page_size) < total,
            next_page: page + 1,
        })
    }

    async fn sweep_statuses(&self) -> Result<SweepCounts, EventError> {
        let now = self.clock.now_local();
        Ok(self.store.event_repo().sweep(now).await?)
    }
}
