//! Date range for filtering aggregated events.

use chrono::{DateTime, Utc};

use crate::event::CalendarEvent;

/// A UTC range with optional bounds. `None` means unbounded in that
/// direction; the default range is fully unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        DateRange { start, end }
    }

    pub fn unbounded() -> Self {
        DateRange::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        DateRange {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Boundary-inclusive intersection with an event's `[start, end]`
    /// interval. Zero-duration events (end defaulted to start) still count
    /// when they touch the range.
    pub fn intersects(&self, event: &CalendarEvent) -> bool {
        let event_start = event.start_utc();
        let event_end = event.end_utc();

        if self.start.is_some_and(|from| event_end < from) {
            return false;
        }
        if self.end.is_some_and(|to| event_start > to) {
            return false;
        }
        true
    }
}
