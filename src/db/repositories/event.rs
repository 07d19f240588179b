use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, sea_query::Expr,
};

use crate::domain::{EventId, EventStatus, UserId};
use crate::entities::events;

/// Which events a listing may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    /// Every non-deleted event.
    All,
    /// Published events plus anything created by this user.
    PublishedOrOwnedBy(UserId),
}

impl EventScope {
    fn condition(self) -> Condition {
        let base = Condition::all().add(events::Column::DeletedAt.is_null());
        match self {
            Self::All => base,
            Self::PublishedOrOwnedBy(user_id) => base.add(
                Condition::any()
                    .add(events::Column::Status.eq(EventStatus::Published))
                    .add(events::Column::CreatedBy.eq(user_id.as_uuid())),
            ),
        }
    }
}

/// Rows changed by one status sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepCounts {
    pub published: u64,
    pub expired: u64,
}

pub struct EventRepository {
    conn: DatabaseConnection,
}

impl EventRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Get a non-deleted event by ID
    pub async fn get(&self, id: EventId) -> Result<Option<events::Model>> {
        events::Entity::find_by_id(id.as_uuid())
            .filter(events::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query event by ID")
    }

    /// Exact, case-sensitive title match among non-deleted events.
    pub async fn title_exists(&self, title: &str, exclude: Option<EventId>) -> Result<bool> {
        let mut query = events::Entity::find()
            .filter(events::Column::DeletedAt.is_null())
            .filter(events::Column::Title.eq(title));
        if let Some(id) = exclude {
            query = query.filter(events::Column::Id.ne(id.as_uuid()));
        }

        let found = query
            .one(&self.conn)
            .await
            .context("Failed to check event title")?;
        Ok(found.is_some())
    }

    pub async fn insert(&self, model: events::ActiveModel) -> Result<events::Model> {
        model
            .insert(&self.conn)
            .await
            .context("Failed to insert event")
    }

    pub async fn update(&self, model: events::ActiveModel) -> Result<events::Model> {
        model
            .update(&self.conn)
            .await
            .context("Failed to update event")
    }

    pub async fn soft_delete(&self, id: EventId) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = events::Entity::update_many()
            .col_expr(events::Column::DeletedAt, Expr::value(now.clone()))
            .col_expr(events::Column::UpdatedAt, Expr::value(now))
            .filter(events::Column::Id.eq(id.as_uuid()))
            .filter(events::Column::DeletedAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to soft delete event")?;

        Ok(result.rows_affected > 0)
    }

    /// One page of events in `scope`, newest first, plus the total match count.
    pub async fn list(
        &self,
        scope: EventScope,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<events::Model>, u64)> {
        let total = events::Entity::find()
            .filter(scope.condition())
            .count(&self.conn)
            .await
            .context("Failed to count events")?;

        let rows = events::Entity::find()
            .filter(scope.condition())
            .order_by_desc(events::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list events")?;

        Ok((rows, total))
    }

    /// Drafts whose publish date has passed become published.
    pub async fn publish_due(&self, now: NaiveDateTime) -> Result<u64> {
        let result = events::Entity::update_many()
            .col_expr(events::Column::Status, Expr::value(EventStatus::Published))
            .col_expr(
                events::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(events::Column::DeletedAt.is_null())
            .filter(events::Column::Status.eq(EventStatus::Draft))
            .filter(events::Column::PublishedDate.is_not_null())
            .filter(events::Column::PublishedDate.lte(now))
            .exec(&self.conn)
            .await
            .context("Failed to publish due events")?;

        Ok(result.rows_affected)
    }

    /// Anything not yet expired whose end time has passed becomes expired.
    pub async fn expire_due(&self, now: NaiveDateTime) -> Result<u64> {
        let result = events::Entity::update_many()
            .col_expr(events::Column::Status, Expr::value(EventStatus::Expired))
            .col_expr(
                events::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(events::Column::DeletedAt.is_null())
            .filter(events::Column::Status.ne(EventStatus::Expired))
            .filter(events::Column::EndTime.lte(now))
            .exec(&self.conn)
            .await
            .context("Failed to expire past events")?;

        Ok(result.rows_affected)
    }

    pub async fn sweep(&self, now: NaiveDateTime) -> Result<SweepCounts> {
        let published = self.publish_due(now).await?;
        let expired = self.expire_due(now).await?;
        Ok(SweepCounts { published, expired })
    }
}
