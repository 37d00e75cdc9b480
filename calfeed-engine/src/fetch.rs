//! Fetch scheduling for ICS subscriptions.
//!
//! Every fetch runs as its own task with its own failure domain: a slow or
//! broken source never delays the others, and a failure only records an
//! error on that subscription's sync state while its cached events stay
//! put.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use calfeed_core::{FeedError, FeedResult, parse_calendar};

use crate::cache::EventCache;
use crate::store::{SubscriptionStore, resolve_in_root};
use crate::subscription::{SourceKind, Subscription};

/// How often the refresh loop re-checks subscription intervals.
const TICK: Duration = Duration::from_secs(60);

/// A retrieval that has not produced a result after this long is failed.
/// Without it, a server that accepts the connection but never responds
/// would keep the in-flight guard held and wedge the subscription.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Fetcher {
    store: Arc<SubscriptionStore>,
    cache: Arc<EventCache>,
    http: reqwest::Client,
    timeout: Duration,
    /// Ids with a fetch currently running; a second request coalesces.
    in_flight: DashSet<String>,
}

impl Fetcher {
    pub fn new(store: Arc<SubscriptionStore>, cache: Arc<EventCache>) -> Self {
        Fetcher {
            store,
            cache,
            http: reqwest::Client::new(),
            timeout: FETCH_TIMEOUT,
            in_flight: DashSet::new(),
        }
    }

    /// Override the retrieval timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch a subscription immediately.
    ///
    /// Disabled subscriptions are a no-op. A fetch already in flight for the
    /// same id coalesces (this call returns without queueing). The returned
    /// error is also recorded as the subscription's `last_error`.
    pub async fn fetch_now(&self, subscription_id: &str) -> FeedResult<()> {
        let Some(subscription) = self.store.get(subscription_id) else {
            return Err(FeedError::SubscriptionNotFound(subscription_id.to_string()));
        };
        if !subscription.enabled {
            return Ok(());
        }

        if !self.in_flight.insert(subscription.id.clone()) {
            debug!(id = %subscription.id, "fetch already in flight, coalescing");
            return Ok(());
        }
        let result = self.fetch_one(&subscription).await;
        self.in_flight.remove(&subscription.id);
        result
    }

    async fn fetch_one(&self, subscription: &Subscription) -> FeedResult<()> {
        let outcome = tokio::time::timeout(self.timeout, self.retrieve(subscription))
            .await
            .unwrap_or_else(|_| {
                Err(FeedError::Retrieval(format!(
                    "no response after {}s",
                    self.timeout.as_secs()
                )))
            });
        let raw = match outcome {
            Ok(raw) => raw,
            Err(err) => {
                warn!(id = %subscription.id, name = %subscription.name, error = %err, "fetch failed");
                self.store.record_failure(&subscription.id, &err.to_string());
                return Err(err);
            }
        };

        let parsed = parse_calendar(&raw, &subscription.id);
        if parsed.skipped > 0 {
            warn!(
                id = %subscription.id,
                skipped = parsed.skipped,
                "dropped unparseable events from feed"
            );
        }

        // The subscription may have been removed or disabled while the
        // retrieval was in flight; its cache slot is no longer live.
        match self.store.get(&subscription.id) {
            Some(current) if current.enabled => {}
            _ => {
                debug!(id = %subscription.id, "subscription went away mid-fetch, discarding result");
                return Ok(());
            }
        }

        info!(
            id = %subscription.id,
            name = %subscription.name,
            events = parsed.events.len(),
            "subscription refreshed"
        );
        self.cache.replace(&subscription.id, parsed.events);
        self.store.record_success(&subscription.id, Utc::now());

        // A removal can land between the check above and the replace. Its
        // eviction would then be overwritten, stranding a slot nothing reads.
        // Whichever side runs last cleans up.
        if self.store.get(&subscription.id).is_none() {
            self.cache.evict(&subscription.id);
        }
        Ok(())
    }

    async fn retrieve(&self, subscription: &Subscription) -> FeedResult<String> {
        match subscription.source_kind {
            SourceKind::Remote => self.retrieve_remote(&subscription.location).await,
            SourceKind::Local => self.retrieve_local(&subscription.location).await,
        }
    }

    async fn retrieve_remote(&self, location: &str) -> FeedResult<String> {
        // Webcal URLs are plain HTTPS underneath.
        let url = match location.strip_prefix("webcal://") {
            Some(rest) => format!("https://{rest}"),
            None => location.to_string(),
        };

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Retrieval(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Retrieval(format!("GET {url} returned {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| FeedError::Retrieval(format!("reading body of {url} failed: {e}")))
    }

    async fn retrieve_local(&self, location: &str) -> FeedResult<String> {
        let path = resolve_in_root(self.store.root(), location)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| FeedError::Retrieval(format!("reading {} failed: {e}", path.display())))
    }
}

/// Handle to the background refresh loop.
pub struct RefreshHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop the refresh loop and wait for it to exit. In-flight fetches
    /// finish on their own tasks.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

/// Start the periodic refresh loop.
///
/// Each tick, every enabled subscription whose refresh interval has elapsed
/// since its last attempt is fetched in its own task. An interval of zero
/// disables periodic refresh for that subscription. Fetch errors stay on
/// the subscription's sync state; the loop itself never fails.
pub fn start_refresh_loop(fetcher: Arc<Fetcher>) -> RefreshHandle {
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let tx = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        let mut last_attempt: HashMap<String, DateTime<Utc>> = HashMap::new();
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("subscription refresh loop started");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tick.tick() => {}
            }

            let now = Utc::now();
            let subscriptions = fetcher.store.list();
            last_attempt.retain(|id, _| subscriptions.iter().any(|s| &s.id == id));

            for subscription in subscriptions {
                if !subscription.enabled || subscription.refresh_interval_minutes == 0 {
                    continue;
                }
                // Out-of-range intervals (hand-edited files) are never due.
                let Some(interval) = i64::try_from(subscription.refresh_interval_minutes)
                    .ok()
                    .and_then(chrono::Duration::try_minutes)
                else {
                    continue;
                };
                let due = last_attempt
                    .get(&subscription.id)
                    .is_none_or(|at| now - *at >= interval);
                if !due {
                    continue;
                }

                last_attempt.insert(subscription.id.clone(), now);
                let fetcher = Arc::clone(&fetcher);
                tokio::spawn(async move {
                    // Failures are already recorded on sync state.
                    let _ = fetcher.fetch_now(&subscription.id).await;
                });
            }
        }
        info!("subscription refresh loop stopped");
    });

    RefreshHandle {
        shutdown_tx: tx,
        handle,
    }
}
