//! The subscription store: single owner of ICS source configuration.
//!
//! All mutation goes through the explicit API here; the fetch scheduler
//! observes the store rather than holding its own copy. Configuration
//! persists to `subscriptions.toml` under the managed root; sync state is
//! in-memory only (it is advisory and cheap to rebuild).

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use calfeed_core::{FeedError, FeedResult};

use crate::subscription::{SourceKind, Subscription, SubscriptionDraft, SubscriptionPatch, SyncState};

const SUBSCRIPTIONS_FILE: &str = "subscriptions.toml";

/// One year. Longer intervals are almost certainly a configuration mistake,
/// and bounding them keeps interval arithmetic in the scheduler trivial.
const MAX_REFRESH_INTERVAL_MINUTES: u64 = 366 * 24 * 60;

/// On-disk layout: one `[[subscriptions]]` record per source.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    subscriptions: Vec<Subscription>,
}

struct Inner {
    subscriptions: Vec<Subscription>,
    sync: HashMap<String, SyncState>,
}

pub struct SubscriptionStore {
    root: PathBuf,
    inner: RwLock<Inner>,
}

impl SubscriptionStore {
    /// Load the store for a managed root, reading persisted configuration
    /// if present.
    pub fn load(root: impl Into<PathBuf>) -> FeedResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(FeedError::Config(format!(
                "managed root '{}' is not a directory",
                root.display()
            )));
        }

        let path = root.join(SUBSCRIPTIONS_FILE);
        let subscriptions = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: StoreFile =
                toml::from_str(&content).map_err(|e| FeedError::Config(e.to_string()))?;
            file.subscriptions
        } else {
            Vec::new()
        };

        Ok(SubscriptionStore {
            root,
            inner: RwLock::new(Inner {
                subscriptions,
                sync: HashMap::new(),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn list(&self) -> Vec<Subscription> {
        self.inner.read().subscriptions.clone()
    }

    pub fn get(&self, id: &str) -> Option<Subscription> {
        self.inner
            .read()
            .subscriptions
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    /// Create a subscription from a validated draft. Never fetches.
    pub fn add(&self, draft: SubscriptionDraft) -> FeedResult<Subscription> {
        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            source_kind: draft.source_kind,
            location: draft.location,
            enabled: draft.enabled,
            color: draft.color,
            refresh_interval_minutes: draft.refresh_interval_minutes,
        };
        self.validate(&subscription)?;

        let mut inner = self.inner.write();
        inner.subscriptions.push(subscription.clone());
        self.save(&inner)?;
        Ok(subscription)
    }

    /// Apply a partial update. The patched result is validated as a whole;
    /// a rejected patch leaves the stored subscription untouched.
    pub fn update(&self, id: &str, patch: SubscriptionPatch) -> FeedResult<Subscription> {
        let mut inner = self.inner.write();
        let position = inner
            .subscriptions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| FeedError::SubscriptionNotFound(id.to_string()))?;

        let mut patched = inner.subscriptions[position].clone();
        if let Some(name) = patch.name {
            patched.name = name;
        }
        if let Some(source_kind) = patch.source_kind {
            patched.source_kind = source_kind;
        }
        if let Some(location) = patch.location {
            patched.location = location;
        }
        if let Some(enabled) = patch.enabled {
            patched.enabled = enabled;
        }
        if let Some(color) = patch.color {
            patched.color = color;
        }
        if let Some(interval) = patch.refresh_interval_minutes {
            patched.refresh_interval_minutes = interval;
        }
        self.validate(&patched)?;

        inner.subscriptions[position] = patched.clone();
        self.save(&inner)?;
        Ok(patched)
    }

    pub fn remove(&self, id: &str) -> FeedResult<()> {
        let mut inner = self.inner.write();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        if inner.subscriptions.len() == before {
            return Err(FeedError::SubscriptionNotFound(id.to_string()));
        }
        inner.sync.remove(id);
        self.save(&inner)?;
        Ok(())
    }

    pub fn last_fetched(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner.read().sync.get(id).and_then(|s| s.last_fetched)
    }

    pub fn last_error(&self, id: &str) -> Option<String> {
        self.inner
            .read()
            .sync
            .get(id)
            .and_then(|s| s.last_error.clone())
    }

    /// Stamp a successful fetch and clear any previous error. Ignored if
    /// the subscription was removed while the fetch ran.
    pub(crate) fn record_success(&self, id: &str, fetched_at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        if !inner.subscriptions.iter().any(|s| s.id == id) {
            return;
        }
        let state = inner.sync.entry(id.to_string()).or_default();
        state.last_fetched = Some(fetched_at);
        state.last_error = None;
    }

    /// Record a failed fetch. The previous `last_fetched` stays put.
    /// Ignored if the subscription was removed while the fetch ran.
    pub(crate) fn record_failure(&self, id: &str, message: &str) {
        let mut inner = self.inner.write();
        if !inner.subscriptions.iter().any(|s| s.id == id) {
            return;
        }
        let state = inner.sync.entry(id.to_string()).or_default();
        state.last_error = Some(message.to_string());
    }

    /// Validate the kind/location pairing of a subscription.
    fn validate(&self, subscription: &Subscription) -> FeedResult<()> {
        if subscription.name.trim().is_empty() {
            return Err(FeedError::Config("subscription name is empty".into()));
        }

        if subscription.refresh_interval_minutes > MAX_REFRESH_INTERVAL_MINUTES {
            return Err(FeedError::Config(format!(
                "refresh interval of {} minutes exceeds the maximum of {MAX_REFRESH_INTERVAL_MINUTES}",
                subscription.refresh_interval_minutes
            )));
        }

        match subscription.source_kind {
            SourceKind::Remote => {
                let url = Url::parse(&subscription.location).map_err(|e| {
                    FeedError::Config(format!(
                        "'{}' is not a valid URL: {e}",
                        subscription.location
                    ))
                })?;
                if !matches!(url.scheme(), "http" | "https" | "webcal") {
                    return Err(FeedError::Config(format!(
                        "unsupported URL scheme '{}' (expected http, https or webcal)",
                        url.scheme()
                    )));
                }
            }
            SourceKind::Local => {
                resolve_in_root(&self.root, &subscription.location)?;
            }
        }
        Ok(())
    }

    /// Write the configuration atomically (tmp + rename).
    fn save(&self, inner: &Inner) -> FeedResult<()> {
        let file = StoreFile {
            subscriptions: inner.subscriptions.clone(),
        };
        let content =
            toml::to_string_pretty(&file).map_err(|e| FeedError::Serialization(e.to_string()))?;

        let path = self.root.join(SUBSCRIPTIONS_FILE);
        let temp = self.root.join(format!("{SUBSCRIPTIONS_FILE}.tmp"));
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &path)?;
        Ok(())
    }
}

/// Resolve a configured local location against the managed root.
///
/// Absolute paths must already lie inside the root; relative paths are
/// joined to it. `..` segments that escape the root are rejected. The
/// resolution is lexical: the file does not need to exist yet.
pub(crate) fn resolve_in_root(root: &Path, location: &str) -> FeedResult<PathBuf> {
    let candidate = Path::new(location);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let mut normalized = PathBuf::new();
    for part in joined.components() {
        match part {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(FeedError::OutsideRoot(joined.clone()));
                }
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }

    if normalized.starts_with(root) {
        Ok(normalized)
    } else {
        Err(FeedError::OutsideRoot(joined))
    }
}
