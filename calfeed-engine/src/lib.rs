//! Calendar aggregation engine.
//!
//! Ingests third-party calendar data (remote and in-root ICS feeds plus
//! events from OAuth-backed provider services) and exposes it as a single
//! time-ordered, source-tagged stream. One broken source never blanks out
//! the others: fetch failures keep the previously cached events.
//!
//! `CalendarFeedEngine` is the entry point for external consumers.

pub mod aggregate;
pub mod cache;
pub mod engine;
pub mod fetch;
pub mod provider;
pub mod store;
pub mod subscription;

pub use aggregate::{AggregationResult, SourceTag, TaggedEvent, collect};
pub use cache::EventCache;
pub use engine::CalendarFeedEngine;
pub use fetch::{Fetcher, RefreshHandle, start_refresh_loop};
pub use provider::{ConnectedProvider, EventDraft, NoProviders, ProviderRegistry, WritableCalendar};
pub use store::SubscriptionStore;
pub use subscription::{SourceKind, Subscription, SubscriptionDraft, SubscriptionPatch};

pub use calfeed_core::{
    Alarm, CalendarEvent, DateRange, EventTime, FeedError, FeedResult, ParsedCalendar,
    parse_calendar,
};
