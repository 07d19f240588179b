use super::ApiError;
use crate::domain::EventId;

/// Dashboard page number; anything missing, non-numeric or below one is page 1.
#[must_use]
pub fn parse_page(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|page| *page >= 1)
        .unwrap_or(1)
}

pub fn validate_event_id(raw: &str) -> Result<EventId, ApiError> {
    raw.parse::<EventId>()
        .map_err(|_| ApiError::NotFound("Event not found".to_string()))
}
