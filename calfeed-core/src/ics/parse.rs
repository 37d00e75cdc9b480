//! Tolerant ICS parsing using the icalendar crate's parser.
//!
//! Real-world feeds (Google exports, hand-written files) are loosely
//! specified. A VEVENT that cannot be understood is skipped and counted,
//! and a feed that cannot be read at all yields an empty result; parsing
//! never fails the batch.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    DatePerhapsTime,
    parser::{Component, read_calendar, unfold},
};

use crate::event::{Alarm, CalendarEvent, EventTime};

/// Result of parsing one feed.
#[derive(Debug, Clone, Default)]
pub struct ParsedCalendar {
    /// Events in source order. Sorting is the aggregator's job.
    pub events: Vec<CalendarEvent>,
    /// Number of VEVENT blocks dropped as unparseable.
    pub skipped: usize,
}

/// Parse raw ICS text into normalized events owned by `subscription_id`.
///
/// Accepts both CRLF and bare-LF line endings. VALARM sub-components fold
/// into their parent event's alarm list and are never emitted as events.
pub fn parse_calendar(raw: &str, subscription_id: &str) -> ParsedCalendar {
    let unfolded = unfold(raw);
    let Ok(calendar) = read_calendar(&unfolded) else {
        return ParsedCalendar::default();
    };

    // Calendar-level zone hint (X-WR-TIMEZONE in Google-style exports).
    // Feeds regularly declare it without a VTIMEZONE block; it applies to
    // floating timestamps only, explicit UTC and per-property TZID win.
    let zone_hint = calendar
        .properties
        .iter()
        .find(|p| p.name == "X-WR-TIMEZONE")
        .and_then(|p| p.val.as_ref().parse::<Tz>().ok());

    let mut parsed = ParsedCalendar::default();
    for component in &calendar.components {
        if component.name != "VEVENT" {
            continue;
        }
        match parse_event(component, subscription_id, zone_hint) {
            Some(event) => parsed.events.push(event),
            None => parsed.skipped += 1,
        }
    }
    parsed
}

/// Parse a single VEVENT. `None` means the block is dropped.
fn parse_event(
    vevent: &Component,
    subscription_id: &str,
    zone_hint: Option<Tz>,
) -> Option<CalendarEvent> {
    let id = vevent.find_prop("UID")?.val.to_string();
    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());

    let start = to_event_time(
        DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?,
        zone_hint,
    );

    // DTEND is optional; a missing end means a zero-duration event.
    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(|dpt| to_event_time(dpt, zone_hint))
        .unwrap_or(start);

    // Mixed date/date-time pairs degrade to the start's kind so all-day
    // events never end up with a time-of-day on one side.
    let end = match (start, end) {
        (EventTime::Date(_), EventTime::DateTime(dt)) => EventTime::Date(dt.date_naive()),
        (EventTime::DateTime(_), EventTime::Date(d)) => {
            EventTime::DateTime(d.and_hms_opt(0, 0, 0).unwrap().and_utc())
        }
        (_, end) => end,
    };

    // Inverted intervals are malformed; the event is dropped.
    if end.as_utc() < start.as_utc() {
        return None;
    }

    let description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    let location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());

    // Alarms come from nested VALARM blocks; a TRIGGER we cannot read drops
    // that alarm, never the event.
    let alarms: Vec<Alarm> = vevent
        .components
        .iter()
        .filter(|c| c.name == "VALARM")
        .filter_map(|alarm| {
            let trigger = alarm.find_prop("TRIGGER")?.val.as_ref();
            parse_trigger_offset(trigger).map(|offset_minutes| Alarm { offset_minutes })
        })
        .collect();

    Some(CalendarEvent {
        id,
        source_id: subscription_id.to_string(),
        title,
        description,
        location,
        start,
        end,
        alarms,
    })
}

/// Convert icalendar's DatePerhapsTime into an EventTime.
///
/// UTC-suffixed stamps are authoritative. Zoned stamps resolve through
/// chrono-tz when the TZID is a known zone name, falling back to the
/// calendar hint and finally to reading the local time as UTC. Floating
/// stamps use the calendar hint the same way.
fn to_event_time(dpt: DatePerhapsTime, zone_hint: Option<Tz>) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => EventTime::DateTime(dt),
            icalendar::CalendarDateTime::Floating(naive) => {
                EventTime::DateTime(resolve_local(naive, zone_hint))
            }
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => EventTime::DateTime(
                resolve_local(date_time, tzid.parse::<Tz>().ok().or(zone_hint)),
            ),
        },
    }
}

/// Best-effort resolution of a local timestamp to UTC.
fn resolve_local(naive: NaiveDateTime, zone: Option<Tz>) -> DateTime<Utc> {
    match zone {
        Some(tz) => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            // DST gap: the local time does not exist in this zone.
            .unwrap_or_else(|| naive.and_utc()),
        None => naive.and_utc(),
    }
}

/// Parse a TRIGGER duration (`-PT15M`, `-P1D`, `PT5M`) into signed minutes
/// relative to the event start. Negative fires before the event.
///
/// Absolute (date-time valued) triggers are rare in subscription feeds and
/// are not supported; they drop the alarm.
fn parse_trigger_offset(value: &str) -> Option<i64> {
    let is_before = value.starts_with('-');
    let duration_str = value.trim_start_matches(['-', '+']);

    let duration = iso8601::duration(duration_str).ok()?;
    let std_duration: std::time::Duration = duration.into();
    let minutes = (std_duration.as_secs() / 60) as i64;

    Some(if is_before { -minutes } else { minutes })
}
