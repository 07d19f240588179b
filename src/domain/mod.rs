//! Domain primitives shared by the services and the HTTP layer.
//!
//! Identifiers are newtypes over [`Uuid`] so a user id can never be passed
//! where an event id is expected.

use chrono::NaiveDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wall-clock format accepted for event start, end and publish dates.
pub const EVENT_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

const EVENT_DATETIME_FORMAT_SECONDS: &str = "%Y-%m-%dT%H:%M:%S";

/// Unique identifier of a user account.
///
/// # Examples
///
/// ```rust
/// use eventdesk::domain::UserId;
///
/// let id = UserId::generate();
/// let parsed: UserId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Unique identifier of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for EventId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Publication state of an event.
///
/// `Draft -> Published -> Expired`, with `Draft -> Expired` when the end
/// time passes before publication. Nothing leaves `Expired`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "published")]
    Published,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl EventStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Expired => "expired",
        }
    }

    /// Statuses a user may choose on the event form.
    #[must_use]
    pub fn parse_submitted(value: &str) -> Option<Self> {
        match value.trim() {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed role set seeded at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleName {
    Admin,
    User,
    Moderator,
}

impl RoleName {
    pub const ALL: [Self; 3] = [Self::Admin, Self::User, Self::Moderator];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::Moderator => "moderator",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a form datetime such as `2025-01-10T10:00` (seconds optional).
#[must_use]
pub fn parse_event_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, EVENT_DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, EVENT_DATETIME_FORMAT_SECONDS))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_datetime_formats() {
        let minute = parse_event_datetime("2025-01-10T10:00").unwrap();
        assert_eq!(minute.to_string(), "2025-01-10 10:00:00");

        let second = parse_event_datetime(" 2025-01-10T10:00:30 ").unwrap();
        assert_eq!(second.to_string(), "2025-01-10 10:00:30");

        assert!(parse_event_datetime("2025-01-10 10:00").is_none());
        assert!(parse_event_datetime("10/01/2025").is_none());
        assert!(parse_event_datetime("").is_none());
    }

    #[test]
    fn test_submitted_status_excludes_expired() {
        assert_eq!(EventStatus::parse_submitted("draft"), Some(EventStatus::Draft));
        assert_eq!(
            EventStatus::parse_submitted("published"),
            Some(EventStatus::Published)
        );
        assert_eq!(EventStatus::parse_submitted("expired"), None);
        assert_eq!(EventStatus::parse_submitted("Published"), None);
    }

    #[test]
    fn test_ids_round_trip_through_strings() {
        let id = EventId::generate();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }

    #[test]
    fn test_event_id_wraps_stored_uuid() {
        let raw = Uuid::new_v4();
        let id = EventId::from_uuid(raw);
        assert_eq!(id.as_uuid(), raw);
        assert_eq!(id, EventId::from(raw));
    }
}
