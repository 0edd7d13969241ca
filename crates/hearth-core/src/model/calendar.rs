// ── Calendar domain types ──

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::entity_id::EntityId;
use crate::error::CoreError;

/// Half-open time window `[start, end)` for an event query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `days` whole days starting at `start`.
    pub fn days_from(start: DateTime<Utc>, days: i64) -> Self {
        Self::new(start, start + Duration::days(days))
    }

    pub(crate) fn service_data(&self) -> Value {
        json!({
            "start_date_time": self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            "end_date_time": self.end.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

/// An event as returned by `calendar.get_events`, before provenance is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCalendarEvent {
    pub summary: String,
    /// RFC 3339 date-time, or `YYYY-MM-DD` for all-day events.
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub recurrence_id: Option<String>,
}

/// A calendar event tagged with the calendar entity it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub calendar_id: EntityId,
    pub summary: String,
    pub start: String,
    pub end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl CalendarEvent {
    pub fn from_raw(calendar_id: EntityId, raw: RawCalendarEvent) -> Self {
        Self {
            calendar_id,
            summary: raw.summary,
            start: raw.start,
            end: raw.end,
            description: raw.description,
            location: raw.location,
            uid: raw.uid,
        }
    }

    pub fn is_all_day(&self) -> bool {
        NaiveDate::parse_from_str(&self.start, "%Y-%m-%d").is_ok()
    }

    /// Start instant; all-day events start at UTC midnight of their date.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        parse_event_time(&self.start)
    }
}

fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Cache key for the merged events of `ids` over `range`.
pub fn events_key(ids: &[EntityId], range: &DateRange) -> String {
    let joined = ids
        .iter()
        .map(EntityId::as_str)
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "calendar:{joined}:{}:{}",
        range.start.timestamp(),
        range.end.timestamp()
    )
}

/// Extract the event list for `entity_id` from a `get_events` response.
pub fn parse_events_response(
    entity_id: &EntityId,
    response: &Value,
) -> Result<Vec<RawCalendarEvent>, CoreError> {
    let context = format!("reading events for {entity_id}");
    let body = response.get("response").unwrap_or(response);
    let Some(events) = body
        .get(entity_id.as_str())
        .and_then(|entry| entry.get("events"))
    else {
        return Err(CoreError::decode(context, "missing events list"));
    };
    serde_json::from_value(events.clone()).map_err(|e| CoreError::decode(context, e))
}

/// Order events by start time; unparseable starts sort last.
pub(crate) fn sort_by_start(events: &mut [CalendarEvent]) {
    events.sort_by_key(|e| (e.start_time().is_none(), e.start_time()));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(start: &str) -> CalendarEvent {
        CalendarEvent {
            calendar_id: EntityId::from("calendar.a"),
            summary: "x".into(),
            start: start.into(),
            end: start.into(),
            description: None,
            location: None,
            uid: None,
        }
    }

    #[test]
    fn serializes_provenance_as_calendar_id() {
        let value = serde_json::to_value(event("2026-10-14")).unwrap();
        assert_eq!(value["calendarId"], "calendar.a");
    }

    #[test]
    fn all_day_detection() {
        assert!(event("2026-10-14").is_all_day());
        assert!(!event("2026-10-14T09:00:00+02:00").is_all_day());
    }

    #[test]
    fn sorts_by_start_with_unparseable_last() {
        let mut events = vec![
            event("garbage"),
            event("2026-10-15T08:00:00Z"),
            event("2026-10-14"),
        ];
        sort_by_start(&mut events);
        assert_eq!(events[0].start, "2026-10-14");
        assert_eq!(events[1].start, "2026-10-15T08:00:00Z");
        assert_eq!(events[2].start, "garbage");
    }

    #[test]
    fn key_is_stable_for_same_inputs() {
        let start = Utc.with_ymd_and_hms(2026, 10, 14, 0, 0, 0).unwrap();
        let range = DateRange::days_from(start, 7);
        let ids = [EntityId::from("calendar.a"), EntityId::from("calendar.b")];
        assert_eq!(events_key(&ids, &range), events_key(&ids, &range));
        assert!(events_key(&ids, &range).starts_with("calendar:calendar.a,calendar.b:"));
    }

    #[test]
    fn service_data_uses_utc_timestamps() {
        let start = Utc.with_ymd_and_hms(2026, 10, 14, 0, 0, 0).unwrap();
        let data = DateRange::days_from(start, 1).service_data();
        assert_eq!(data["start_date_time"], "2026-10-14T00:00:00Z");
        assert_eq!(data["end_date_time"], "2026-10-15T00:00:00Z");
    }

    #[test]
    fn parses_events_response() {
        let response = serde_json::json!({
            "calendar.a": { "events": [ { "summary": "Dentist", "start": "2026-10-14", "end": "2026-10-15" } ] }
        });
        let events = parse_events_response(&EntityId::from("calendar.a"), &response).unwrap();
        assert_eq!(events[0].summary, "Dentist");
    }
}
