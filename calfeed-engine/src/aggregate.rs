//! Merging provider and subscription events into one ordered view.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use calfeed_core::{CalendarEvent, DateRange};

use crate::cache::EventCache;
use crate::provider::ProviderRegistry;
use crate::store::SubscriptionStore;

/// Normalized origin of an aggregated event. Attached once at aggregation
/// time so rendering code never has to sniff identifier strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Google,
    Microsoft,
    Ics,
    Unknown,
}

impl SourceTag {
    /// Derive the tag from a provider event's own source identifier.
    /// Unrecognized prefixes tag as `Unknown`.
    fn from_provider_source(source_id: &str) -> Self {
        let lower = source_id.to_ascii_lowercase();
        if lower.starts_with("google") {
            SourceTag::Google
        } else if lower.starts_with("microsoft") || lower.starts_with("outlook") {
            SourceTag::Microsoft
        } else {
            SourceTag::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Google => "google",
            SourceTag::Microsoft => "microsoft",
            SourceTag::Ics => "ics",
            SourceTag::Unknown => "unknown",
        }
    }
}

/// An event annotated with its normalized origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedEvent {
    pub provider: SourceTag,
    #[serde(flatten)]
    pub event: CalendarEvent,
}

/// The aggregated view external consumers render. Recomputed on every call,
/// never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AggregationResult {
    /// Ascending by start; ties keep their input order.
    pub events: Vec<TaggedEvent>,
    pub total: usize,
    /// Per-tag event counts. The values sum to `total`.
    pub sources: BTreeMap<String, usize>,
}

/// Merge provider events and cached subscription events into one sorted,
/// range-filtered, source-tagged sequence.
///
/// Pure over its collaborators' snapshots: no I/O, no suspension, safe to
/// call on every view refresh. Absent or empty sources produce an empty
/// result, not an error.
pub fn collect(
    registry: &dyn ProviderRegistry,
    store: &SubscriptionStore,
    cache: &EventCache,
    range: &DateRange,
) -> AggregationResult {
    let mut events: Vec<TaggedEvent> = Vec::new();

    for provider in registry.connected_providers() {
        for event in provider.events {
            if !range.intersects(&event) {
                continue;
            }
            let provider = SourceTag::from_provider_source(&event.source_id);
            events.push(TaggedEvent { provider, event });
        }
    }

    for subscription in store.list() {
        if !subscription.enabled {
            continue;
        }
        let Some(snapshot) = cache.snapshot(&subscription.id) else {
            continue;
        };
        for event in snapshot.iter() {
            if range.intersects(event) {
                events.push(TaggedEvent {
                    provider: SourceTag::Ics,
                    event: event.clone(),
                });
            }
        }
    }

    // Vec::sort_by_key is stable, so equal starts preserve input order.
    events.sort_by_key(|tagged| tagged.event.start_utc());

    let mut sources: BTreeMap<String, usize> = BTreeMap::new();
    for tagged in &events {
        *sources.entry(tagged.provider.as_str().to_string()).or_default() += 1;
    }

    AggregationResult {
        total: events.len(),
        sources,
        events,
    }
}
