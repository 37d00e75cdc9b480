//! Core types for the calfeed aggregation engine.
//!
//! This crate provides the pieces shared by the engine and by provider
//! adapters:
//! - `CalendarEvent` and related event types
//! - tolerant ICS parsing (`ics` module)
//! - shared error types and the date range used for filtering

pub mod date_range;
pub mod error;
pub mod event;
pub mod ics;

pub use date_range::DateRange;
pub use error::{FeedError, FeedResult};
pub use event::{Alarm, CalendarEvent, EventTime};
pub use ics::{ParsedCalendar, parse_calendar};
