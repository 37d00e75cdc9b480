//! The engine facade external consumers talk to.
//!
//! Wires the subscription store, event cache, fetcher and provider registry
//! together and exposes the operations views and controllers need. All
//! configuration mutation flows through here into the store; nothing else
//! owns subscription state.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use calfeed_core::{CalendarEvent, DateRange, FeedResult};

use crate::aggregate::{self, AggregationResult};
use crate::cache::EventCache;
use crate::fetch::{Fetcher, RefreshHandle, start_refresh_loop};
use crate::provider::{EventDraft, ProviderRegistry, WritableCalendar};
use crate::store::SubscriptionStore;
use crate::subscription::{Subscription, SubscriptionDraft, SubscriptionPatch};

pub struct CalendarFeedEngine {
    store: Arc<SubscriptionStore>,
    cache: Arc<EventCache>,
    fetcher: Arc<Fetcher>,
    registry: Arc<dyn ProviderRegistry>,
    refresh: Option<RefreshHandle>,
}

impl CalendarFeedEngine {
    /// Load the engine for a managed root. Restores persisted subscription
    /// configuration; caches start empty until the first fetch.
    pub fn load(root: impl Into<PathBuf>, registry: Arc<dyn ProviderRegistry>) -> FeedResult<Self> {
        let store = Arc::new(SubscriptionStore::load(root)?);
        let cache = Arc::new(EventCache::new());
        let fetcher = Arc::new(Fetcher::new(Arc::clone(&store), Arc::clone(&cache)));

        Ok(CalendarFeedEngine {
            store,
            cache,
            fetcher,
            registry,
            refresh: None,
        })
    }

    /// Start periodic refreshing. Idempotent.
    pub fn start_refresh(&mut self) {
        if self.refresh.is_none() {
            self.refresh = Some(start_refresh_loop(Arc::clone(&self.fetcher)));
        }
    }

    /// Stop the refresh loop, if running, and wait for it to exit.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.refresh.take() {
            handle.stop().await;
        }
    }

    // ---- subscription configuration ----

    pub fn list_subscriptions(&self) -> Vec<Subscription> {
        self.store.list()
    }

    pub fn add_subscription(&self, draft: SubscriptionDraft) -> FeedResult<Subscription> {
        self.store.add(draft)
    }

    pub fn update_subscription(
        &self,
        id: &str,
        patch: SubscriptionPatch,
    ) -> FeedResult<Subscription> {
        self.store.update(id, patch)
    }

    /// Remove a subscription and drop its cached events.
    pub fn remove_subscription(&self, id: &str) -> FeedResult<()> {
        self.store.remove(id)?;
        self.cache.evict(id);
        Ok(())
    }

    // ---- sync state ----

    pub fn get_last_fetched(&self, id: &str) -> Option<DateTime<Utc>> {
        self.store.last_fetched(id)
    }

    pub fn get_last_error(&self, id: &str) -> Option<String> {
        self.store.last_error(id)
    }

    /// Manual refresh of a single subscription.
    pub async fn fetch_now(&self, id: &str) -> FeedResult<()> {
        self.fetcher.fetch_now(id).await
    }

    // ---- the read path ----

    /// The aggregated view: provider and cached subscription events, range
    /// filtered, sorted by start, tagged by source.
    pub fn collect(&self, range: &DateRange) -> AggregationResult {
        aggregate::collect(self.registry.as_ref(), &self.store, &self.cache, range)
    }

    // ---- provider write-back passthroughs (UI flows) ----

    pub async fn list_writable_calendars(
        &self,
        provider_id: &str,
    ) -> FeedResult<Vec<WritableCalendar>> {
        self.registry.list_writable_calendars(provider_id).await
    }

    pub async fn create_provider_event(
        &self,
        provider_id: &str,
        calendar_id: &str,
        draft: EventDraft,
    ) -> FeedResult<CalendarEvent> {
        self.registry.create_event(provider_id, calendar_id, draft).await
    }
}
