//! End-to-end tests for the aggregation engine: fetch, cache, sync state
//! and the merged view, over a temporary managed root and a mock HTTP
//! server.

use std::sync::Arc;
use std::time::Duration;

use calfeed_engine::{
    CalendarFeedEngine, DateRange, EventCache, FeedError, Fetcher, NoProviders, SourceKind,
    SubscriptionDraft, SubscriptionPatch, SubscriptionStore,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED_TWO_EVENTS: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Test//Feed//EN\r\n\
BEGIN:VEVENT\r\n\
UID:one@test\r\n\
SUMMARY:One\r\n\
DTSTART:20250601T090000Z\r\n\
DTEND:20250601T100000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:two@test\r\n\
SUMMARY:Two\r\n\
DTSTART:20250601T110000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

const FEED_ONE_EVENT: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Test//Feed//EN\r\n\
BEGIN:VEVENT\r\n\
UID:three@test\r\n\
SUMMARY:Three\r\n\
DTSTART:20250602T090000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

fn engine_in(dir: &tempfile::TempDir) -> CalendarFeedEngine {
    CalendarFeedEngine::load(dir.path(), Arc::new(NoProviders)).unwrap()
}

fn remote_draft(name: &str, url: String) -> SubscriptionDraft {
    SubscriptionDraft {
        name: name.into(),
        source_kind: SourceKind::Remote,
        location: url,
        enabled: true,
        color: "#3366ff".into(),
        refresh_interval_minutes: 0,
    }
}

async fn mount_feed(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/feed.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_slow_feed(server: &MockServer, body: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/feed.ics"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// A bare fetcher over its own root, for tests that drive the store and
/// cache directly.
fn fetcher_in(dir: &tempfile::TempDir) -> (Arc<SubscriptionStore>, Arc<EventCache>, Arc<Fetcher>) {
    let store = Arc::new(SubscriptionStore::load(dir.path()).unwrap());
    let cache = Arc::new(EventCache::new());
    let fetcher = Arc::new(Fetcher::new(Arc::clone(&store), Arc::clone(&cache)));
    (store, cache, fetcher)
}

#[tokio::test]
async fn remote_fetch_populates_cache_and_sync_state() {
    let server = MockServer::start().await;
    mount_feed(&server, FEED_TWO_EVENTS).await;

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);
    let sub = engine
        .add_subscription(remote_draft("Team", format!("{}/feed.ics", server.uri())))
        .unwrap();

    assert!(engine.get_last_fetched(&sub.id).is_none());
    engine.fetch_now(&sub.id).await.unwrap();

    assert!(engine.get_last_fetched(&sub.id).is_some());
    assert!(engine.get_last_error(&sub.id).is_none());

    let result = engine.collect(&DateRange::unbounded());
    assert_eq!(result.total, 2);
    assert_eq!(result.sources.get("ics"), Some(&2));
    // Sorted by start.
    assert_eq!(result.events[0].event.id, "one@test");
    assert_eq!(result.events[1].event.id, "two@test");
}

#[tokio::test]
async fn failed_fetch_keeps_stale_cache_and_records_error() {
    let server = MockServer::start().await;
    mount_feed(&server, FEED_TWO_EVENTS).await;

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);
    let sub = engine
        .add_subscription(remote_draft("Team", format!("{}/feed.ics", server.uri())))
        .unwrap();

    engine.fetch_now(&sub.id).await.unwrap();
    let fetched_at = engine.get_last_fetched(&sub.id).unwrap();

    // The feed starts failing.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/feed.ics"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = engine.fetch_now(&sub.id).await.unwrap_err();
    assert!(matches!(err, FeedError::Retrieval(_)));

    // Stale data beats an empty calendar.
    assert_eq!(engine.collect(&DateRange::unbounded()).total, 2);
    assert!(engine.get_last_error(&sub.id).is_some());
    assert_eq!(engine.get_last_fetched(&sub.id), Some(fetched_at));

    // Recovery: the next success clears the error and replaces the cache.
    server.reset().await;
    mount_feed(&server, FEED_ONE_EVENT).await;
    engine.fetch_now(&sub.id).await.unwrap();

    assert!(engine.get_last_error(&sub.id).is_none());
    let result = engine.collect(&DateRange::unbounded());
    assert_eq!(result.total, 1);
    assert_eq!(result.events[0].event.id, "three@test");
}

#[tokio::test]
async fn one_broken_subscription_never_blanks_the_others() {
    let good = MockServer::start().await;
    mount_feed(&good, FEED_TWO_EVENTS).await;
    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&broken)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);
    let good_sub = engine
        .add_subscription(remote_draft("Good", format!("{}/feed.ics", good.uri())))
        .unwrap();
    let broken_sub = engine
        .add_subscription(remote_draft("Broken", format!("{}/feed.ics", broken.uri())))
        .unwrap();

    engine.fetch_now(&good_sub.id).await.unwrap();
    assert!(engine.fetch_now(&broken_sub.id).await.is_err());

    let result = engine.collect(&DateRange::unbounded());
    assert_eq!(result.total, 2, "the broken source must not hide the good one");
    assert!(engine.get_last_error(&broken_sub.id).is_some());
    assert!(engine.get_last_error(&good_sub.id).is_none());
}

#[tokio::test]
async fn local_fetch_reads_files_inside_the_root() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("calendars")).unwrap();
    std::fs::write(dir.path().join("calendars/work.ics"), FEED_TWO_EVENTS).unwrap();

    let engine = engine_in(&dir);
    let sub = engine
        .add_subscription(SubscriptionDraft {
            name: "Work".into(),
            source_kind: SourceKind::Local,
            location: "calendars/work.ics".into(),
            enabled: true,
            color: "#cc0000".into(),
            refresh_interval_minutes: 0,
        })
        .unwrap();

    engine.fetch_now(&sub.id).await.unwrap();
    assert_eq!(engine.collect(&DateRange::unbounded()).total, 2);
}

#[tokio::test]
async fn out_of_root_local_path_fails_with_explicit_scope_error() {
    let dir = tempfile::tempdir().unwrap();

    // The store rejects such configuration up front, so simulate a
    // hand-edited subscriptions file pointing outside the root.
    let toml = r##"
[[subscriptions]]
id = "handmade"
name = "Escapee"
source_kind = "local"
location = "/etc/passwd"
enabled = true
color = "#000000"
refresh_interval_minutes = 0
"##;
    std::fs::write(dir.path().join("subscriptions.toml"), toml).unwrap();

    let engine = engine_in(&dir);
    let err = engine.fetch_now("handmade").await.unwrap_err();
    let message = err.to_string();
    assert!(
        message.contains("inside the managed root"),
        "expected an explicit scope error, not a bare not-found: {message}"
    );
    assert!(
        engine
            .get_last_error("handmade")
            .is_some_and(|e| e.contains("inside the managed root"))
    );
}

#[tokio::test]
async fn missing_local_file_is_a_retrieval_error_not_a_scope_error() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);
    let sub = engine
        .add_subscription(SubscriptionDraft {
            name: "Ghost".into(),
            source_kind: SourceKind::Local,
            location: "missing.ics".into(),
            enabled: true,
            color: "#cc0000".into(),
            refresh_interval_minutes: 0,
        })
        .unwrap();

    let err = engine.fetch_now(&sub.id).await.unwrap_err();
    assert!(matches!(err, FeedError::Retrieval(_)));
}

#[tokio::test]
async fn disabled_subscription_fetch_is_a_no_op() {
    let server = MockServer::start().await;
    mount_feed(&server, FEED_TWO_EVENTS).await;

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);
    let sub = engine
        .add_subscription(remote_draft("Paused", format!("{}/feed.ics", server.uri())))
        .unwrap();
    engine
        .update_subscription(
            &sub.id,
            SubscriptionPatch {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

    engine.fetch_now(&sub.id).await.unwrap();
    assert!(engine.get_last_fetched(&sub.id).is_none());
    assert_eq!(engine.collect(&DateRange::unbounded()).total, 0);
}

#[tokio::test]
async fn fetch_of_unknown_subscription_errors() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);
    assert!(matches!(
        engine.fetch_now("nope").await,
        Err(FeedError::SubscriptionNotFound(_))
    ));
}

#[tokio::test]
async fn removal_evicts_cached_events() {
    let server = MockServer::start().await;
    mount_feed(&server, FEED_TWO_EVENTS).await;

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);
    let sub = engine
        .add_subscription(remote_draft("Gone", format!("{}/feed.ics", server.uri())))
        .unwrap();

    engine.fetch_now(&sub.id).await.unwrap();
    assert_eq!(engine.collect(&DateRange::unbounded()).total, 2);

    engine.remove_subscription(&sub.id).unwrap();
    assert_eq!(engine.collect(&DateRange::unbounded()).total, 0);
    assert!(engine.list_subscriptions().is_empty());
}

#[tokio::test]
async fn hung_remote_times_out_and_releases_the_subscription() {
    let server = MockServer::start().await;
    mount_slow_feed(&server, FEED_TWO_EVENTS, Duration::from_secs(5)).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SubscriptionStore::load(dir.path()).unwrap());
    let cache = Arc::new(EventCache::new());
    let fetcher = Fetcher::new(Arc::clone(&store), Arc::clone(&cache))
        .with_timeout(Duration::from_millis(100));
    let sub = store
        .add(remote_draft("Stuck", format!("{}/feed.ics", server.uri())))
        .unwrap();

    let err = fetcher.fetch_now(&sub.id).await.unwrap_err();
    assert!(matches!(err, FeedError::Retrieval(_)));
    assert!(
        store
            .last_error(&sub.id)
            .is_some_and(|e| e.contains("no response")),
        "a hung feed must surface as a recorded error, not hang forever"
    );
    assert!(cache.snapshot(&sub.id).is_none());

    // The timeout also releases the in-flight guard: once the feed responds
    // promptly again, the same subscription fetches fine.
    server.reset().await;
    mount_feed(&server, FEED_ONE_EVENT).await;
    fetcher.fetch_now(&sub.id).await.unwrap();
    assert!(store.last_error(&sub.id).is_none());
    assert_eq!(cache.snapshot(&sub.id).map(|events| events.len()), Some(1));
}

#[tokio::test]
async fn concurrent_fetches_for_one_subscription_coalesce() {
    let server = MockServer::start().await;
    mount_slow_feed(&server, FEED_TWO_EVENTS, Duration::from_millis(500)).await;

    let dir = tempfile::tempdir().unwrap();
    let (store, cache, fetcher) = fetcher_in(&dir);
    let sub = store
        .add(remote_draft("Busy", format!("{}/feed.ics", server.uri())))
        .unwrap();

    let first = tokio::spawn({
        let fetcher = Arc::clone(&fetcher);
        let id = sub.id.clone();
        async move { fetcher.fetch_now(&id).await }
    });
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The second caller returns immediately instead of queueing a request.
    fetcher.fetch_now(&sub.id).await.unwrap();
    first.await.unwrap().unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "the overlapping fetch must coalesce");
    assert_eq!(cache.snapshot(&sub.id).map(|events| events.len()), Some(2));
}

#[tokio::test]
async fn removal_mid_fetch_discards_the_result() {
    let server = MockServer::start().await;
    mount_slow_feed(&server, FEED_TWO_EVENTS, Duration::from_millis(500)).await;

    let dir = tempfile::tempdir().unwrap();
    let (store, cache, fetcher) = fetcher_in(&dir);
    let sub = store
        .add(remote_draft("Doomed", format!("{}/feed.ics", server.uri())))
        .unwrap();

    let fetch = tokio::spawn({
        let fetcher = Arc::clone(&fetcher);
        let id = sub.id.clone();
        async move { fetcher.fetch_now(&id).await }
    });
    tokio::time::sleep(Duration::from_millis(150)).await;

    store.remove(&sub.id).unwrap();
    cache.evict(&sub.id);

    // The late retrieval completes but its result is dropped.
    fetch.await.unwrap().unwrap();
    assert!(cache.snapshot(&sub.id).is_none());
    assert!(store.last_fetched(&sub.id).is_none());
}

#[tokio::test]
async fn disabling_mid_fetch_discards_the_result() {
    let server = MockServer::start().await;
    mount_slow_feed(&server, FEED_TWO_EVENTS, Duration::from_millis(500)).await;

    let dir = tempfile::tempdir().unwrap();
    let (store, cache, fetcher) = fetcher_in(&dir);
    let sub = store
        .add(remote_draft("Paused", format!("{}/feed.ics", server.uri())))
        .unwrap();

    let fetch = tokio::spawn({
        let fetcher = Arc::clone(&fetcher);
        let id = sub.id.clone();
        async move { fetcher.fetch_now(&id).await }
    });
    tokio::time::sleep(Duration::from_millis(150)).await;

    store
        .update(
            &sub.id,
            SubscriptionPatch {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

    fetch.await.unwrap().unwrap();
    assert!(cache.snapshot(&sub.id).is_none());
}

#[tokio::test]
async fn range_filtered_collect_over_fetched_events() {
    let server = MockServer::start().await;
    mount_feed(&server, FEED_TWO_EVENTS).await;

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);
    let sub = engine
        .add_subscription(remote_draft("Team", format!("{}/feed.ics", server.uri())))
        .unwrap();
    engine.fetch_now(&sub.id).await.unwrap();

    use chrono::TimeZone;
    let range = DateRange::between(
        chrono::Utc.with_ymd_and_hms(2025, 6, 1, 10, 30, 0).unwrap(),
        chrono::Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    );
    let result = engine.collect(&range);
    assert_eq!(result.total, 1);
    assert_eq!(result.events[0].event.id, "two@test");
}
