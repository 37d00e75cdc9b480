//! Per-subscription cache of the most recent successful parse.
//!
//! Slots are partitioned by subscription id and replaced atomically, so
//! concurrent fetches never contend on the same slot and readers always see
//! a complete event list. A failed fetch never touches a slot: stale data
//! beats an empty calendar.

use std::sync::Arc;

use dashmap::DashMap;

use calfeed_core::CalendarEvent;

#[derive(Debug, Default)]
pub struct EventCache {
    slots: DashMap<String, Arc<[CalendarEvent]>>,
}

impl EventCache {
    pub fn new() -> Self {
        EventCache::default()
    }

    /// Replace a subscription's slot with a freshly parsed batch.
    pub fn replace(&self, subscription_id: &str, events: Vec<CalendarEvent>) {
        self.slots.insert(subscription_id.to_string(), events.into());
    }

    /// Consistent-at-call-time snapshot of a subscription's cached events.
    pub fn snapshot(&self, subscription_id: &str) -> Option<Arc<[CalendarEvent]>> {
        self.slots
            .get(subscription_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drop the slot of a removed subscription.
    pub fn evict(&self, subscription_id: &str) {
        self.slots.remove(subscription_id);
    }
}
