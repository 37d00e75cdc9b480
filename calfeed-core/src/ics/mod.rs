//! ICS (iCalendar) feed parsing.

mod parse;

pub use parse::{ParsedCalendar, parse_calendar};
