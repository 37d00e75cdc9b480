//! Provider registry boundary.
//!
//! OAuth-backed calendar services (token acquisition, provider APIs) live
//! entirely outside the engine. The engine consumes them through this
//! trait: connected providers hand over already-materialized, already
//! timezone-resolved events synchronously, and write-back delegates to the
//! service. The engine owns no provider state and never mutates or persists
//! provider events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use calfeed_core::{CalendarEvent, EventTime, FeedResult};

/// A provider connection and its resident event snapshot.
#[derive(Debug, Clone)]
pub struct ConnectedProvider {
    pub id: String,
    pub events: Vec<CalendarEvent>,
}

/// A provider calendar that accepts new events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritableCalendar {
    pub id: String,
    pub name: String,
}

/// Input for provider-side event creation. Used only by UI flows outside
/// the aggregation core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
}

#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// Connected providers with their already-materialized events. Must not
    /// block: the aggregator calls this on every view refresh.
    fn connected_providers(&self) -> Vec<ConnectedProvider>;

    /// Calendars of a provider that accept event creation.
    async fn list_writable_calendars(
        &self,
        provider_id: &str,
    ) -> FeedResult<Vec<WritableCalendar>>;

    /// Delegate event creation to the provider service.
    async fn create_event(
        &self,
        provider_id: &str,
        calendar_id: &str,
        draft: EventDraft,
    ) -> FeedResult<CalendarEvent>;
}

/// A registry with no connected providers; useful when only ICS
/// subscriptions are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProviders;

#[async_trait]
impl ProviderRegistry for NoProviders {
    fn connected_providers(&self) -> Vec<ConnectedProvider> {
        Vec::new()
    }

    async fn list_writable_calendars(
        &self,
        provider_id: &str,
    ) -> FeedResult<Vec<WritableCalendar>> {
        Err(calfeed_core::FeedError::Provider(format!(
            "no provider connected with id '{provider_id}'"
        )))
    }

    async fn create_event(
        &self,
        provider_id: &str,
        _calendar_id: &str,
        _draft: EventDraft,
    ) -> FeedResult<CalendarEvent> {
        Err(calfeed_core::FeedError::Provider(format!(
            "no provider connected with id '{provider_id}'"
        )))
    }
}
