//! Source-neutral calendar event types.
//!
//! Both ICS subscriptions and provider adapters normalize into these types;
//! everything downstream (caching, aggregation, rendering) works exclusively
//! with them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A normalized calendar event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Unique within its source (ICS UID or provider event id).
    pub id: String,
    /// Identifier of the owning subscription or provider.
    pub source_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    /// Always populated: sources that omit an end get `end == start`.
    pub end: EventTime,
    /// Reminder offsets relative to `start`, in source order.
    pub alarms: Vec<Alarm>,
}

impl CalendarEvent {
    /// Whether this is a date-only (all-day) event.
    pub fn all_day(&self) -> bool {
        matches!(self.start, EventTime::Date(_))
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.as_utc()
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.as_utc()
    }
}

/// When an event starts or ends.
///
/// All-day events carry a calendar date with no time-of-day; their declared
/// ends are exclusive (a one-day event ends the following date). Timed
/// events are instants resolved to UTC at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl EventTime {
    /// The instant used for ordering and range intersection.
    /// Dates compare at midnight UTC.
    pub fn as_utc(&self) -> DateTime<Utc> {
        match self {
            EventTime::Date(d) => d.and_hms_opt(0, 0, 0).unwrap().and_utc(),
            EventTime::DateTime(dt) => *dt,
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }
}

/// A reminder attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// Signed offset from the event start, in minutes.
    /// `-15` fires fifteen minutes before the event.
    pub offset_minutes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_events_compare_at_midnight_utc() {
        let time = EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 20).unwrap());
        assert_eq!(
            time.as_utc(),
            Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn all_day_follows_the_start_variant() {
        let event = CalendarEvent {
            id: "e1".into(),
            source_id: "sub1".into(),
            title: "Offsite".into(),
            description: None,
            location: None,
            start: EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 20).unwrap()),
            end: EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 21).unwrap()),
            alarms: vec![],
        };
        assert!(event.all_day());
    }
}
