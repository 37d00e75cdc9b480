//! Subscription configuration types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a subscription's ICS data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Fetched over HTTP(S) from a URL.
    Remote,
    /// Read from a file inside the managed root.
    Local,
}

/// A configured ICS source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub name: String,
    pub source_kind: SourceKind,
    /// URL for remote sources, root-relative path for local ones.
    pub location: String,
    pub enabled: bool,
    /// Display color, passed through to consumers untouched.
    pub color: String,
    /// Zero disables periodic refresh; on-demand fetches still work.
    pub refresh_interval_minutes: u64,
}

/// Input for creating a subscription. The store generates the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionDraft {
    pub name: String,
    pub source_kind: SourceKind,
    pub location: String,
    pub enabled: bool,
    pub color: String,
    pub refresh_interval_minutes: u64,
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionPatch {
    pub name: Option<String>,
    pub source_kind: Option<SourceKind>,
    pub location: Option<String>,
    pub enabled: Option<bool>,
    pub color: Option<String>,
    pub refresh_interval_minutes: Option<u64>,
}

/// Advisory fetch state. Attached to a subscription but mutated only by the
/// fetch scheduler, never by configuration edits. Not persisted.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub last_fetched: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
