// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `CoalescingCache`.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use hoard::{CacheBackend, CacheOptions, CacheStats, CoalescingCache, Error, NoopBackend, Policy};
use hoard_tier::testing::{BackendOp, MockBackend};

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
enum FetchError {
    #[error("registry unreachable")]
    Unreachable,
    #[error("cache failure: {0}")]
    Cache(String),
}

impl From<Error> for FetchError {
    fn from(error: Error) -> Self {
        Self::Cache(error.to_string())
    }
}

fn cache() -> CoalescingCache<MockBackend> {
    CoalescingCache::builder(MockBackend::new()).logs(false).build()
}

fn stats(hits: u64, misses: u64, deferred: u64) -> CacheStats {
    CacheStats { hits, misses, deferred }
}

#[tokio::test]
async fn second_sequential_call_is_a_hit() {
    let cache = cache();
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let calls = &calls;
        let value = cache
            .get_or_set(CacheOptions::new("k").ttl(Duration::from_secs(10)), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>("value".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "value");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats(), stats(1, 1, 0));
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_share_one_computation() {
    let cache = cache();
    let calls = AtomicUsize::new(0);
    let options = CacheOptions::new("k").ttl(Duration::from_secs(10));

    let results = join_all((0..3).map(|_| {
        let calls = &calls;
        cache.get_or_set(options.clone(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, Infallible>("x".to_string())
        })
    }))
    .await;

    assert!(results.iter().all(|result| result.as_deref() == Ok("x")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats(), stats(0, 1, 2));
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn failures_are_never_cached() {
    let cache = cache();

    for _ in 0..2 {
        let outcome = cache
            .get_or_set_either(CacheOptions::<_, u32>::new("k"), || async { Err(FetchError::Unreachable) })
            .await;
        assert_eq!(outcome, Err(FetchError::Unreachable));
    }

    assert_eq!(cache.stats(), stats(0, 2, 0));
    assert!(cache.backend().set_ttls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn followers_receive_the_leaders_failure() {
    let cache = cache();
    let calls = AtomicUsize::new(0);

    let outcomes = join_all((0..3).map(|_| {
        let calls = &calls;
        cache.get_or_set_either(CacheOptions::<_, u32>::new("k"), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(FetchError::Unreachable)
        })
    }))
    .await;

    assert!(outcomes.iter().all(|outcome| *outcome == Err(FetchError::Unreachable)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats(), stats(0, 1, 2));
}

#[tokio::test]
async fn nil_values_are_cached_only_when_asked() {
    let cache = cache();
    let options = CacheOptions::new("cached-null")
        .policy(|_: &Option<String>| Policy::new().cache_nil(true).ttl(Duration::from_secs(10)));

    for _ in 0..2 {
        let value = cache.get_or_set(options.clone(), || async { Ok::<_, Infallible>(None) }).await.unwrap();
        assert_eq!(value, None);
    }
    assert_eq!(cache.stats(), stats(1, 1, 0));

    let options = CacheOptions::new("uncached-null")
        .policy(|_: &Option<String>| Policy::new().cache_nil(false).ttl(Duration::from_secs(10)));
    for _ in 0..2 {
        let value = cache.get_or_set(options.clone(), || async { Ok::<_, Infallible>(None) }).await.unwrap();
        assert_eq!(value, None);
    }
    assert_eq!(cache.stats(), stats(1, 3, 0));
}

#[tokio::test]
async fn nil_values_are_skipped_by_default() {
    let cache = cache();

    let value = cache
        .get_or_set(CacheOptions::new("k"), || async { Ok::<Option<u32>, Infallible>(None) })
        .await
        .unwrap();

    assert_eq!(value, None);
    assert_eq!(cache.backend().entry_count(), 0);
}

#[tokio::test]
async fn cache_nil_option_stores_nil_values() {
    let cache = cache();

    for _ in 0..2 {
        cache
            .get_or_set(CacheOptions::new("k").cache_nil(true), || async { Ok::<Option<u32>, Infallible>(None) })
            .await
            .unwrap();
    }

    assert_eq!(cache.stats(), stats(1, 1, 0));
}

#[tokio::test]
async fn namespaces_never_collide() {
    let cache = cache();

    let a = cache
        .get_or_set(CacheOptions::new("k").namespace("a"), || async { Ok::<_, Infallible>("from a".to_string()) })
        .await
        .unwrap();
    let b = cache
        .get_or_set(CacheOptions::new("k").namespace("b"), || async { Ok::<_, Infallible>("from b".to_string()) })
        .await
        .unwrap();

    assert_eq!((a.as_str(), b.as_str()), ("from a", "from b"));
    assert_eq!(cache.stats(), stats(0, 2, 0));

    let keys: Vec<String> = cache.backend().operations().iter().map(|op| op.key().to_string()).collect();
    assert!(keys.iter().any(|key| key.starts_with("a:")));
    assert!(keys.iter().any(|key| key.starts_with("b:")));
}

#[tokio::test]
async fn policy_ttl_overrides_the_call_ttl() {
    let cache = cache();
    let options = CacheOptions::new("k")
        .ttl(Duration::from_secs(60))
        .policy(|_: &u32| Policy::new().ttl(Duration::from_secs(1)));

    cache.get_or_set(options, || async { Ok::<_, Infallible>(1) }).await.unwrap();

    assert_eq!(cache.backend().set_ttls(), vec![Some(Duration::from_secs(1))]);
}

#[tokio::test]
async fn policy_sees_the_computed_value() {
    let cache = cache();
    let options = CacheOptions::new("k")
        .ttl(Duration::from_secs(60))
        .policy(|value: &u32| if *value > 10 { Policy::new().ttl(Duration::from_secs(2)) } else { Policy::default() });

    cache.get_or_set(options.clone(), || async { Ok::<_, Infallible>(1) }).await.unwrap();
    cache.backend().clear();
    cache.get_or_set(options, || async { Ok::<_, Infallible>(11) }).await.unwrap();

    assert_eq!(
        cache.backend().set_ttls(),
        vec![Some(Duration::from_secs(60)), Some(Duration::from_secs(2))]
    );
}

#[tokio::test]
async fn default_ttl_applies_without_overrides() {
    let cache = cache();
    cache.get_or_set(CacheOptions::new("k"), || async { Ok::<_, Infallible>(1) }).await.unwrap();

    let custom = CoalescingCache::builder(MockBackend::new())
        .default_ttl(Duration::from_secs(30))
        .logs(false)
        .build();
    custom.get_or_set(CacheOptions::new("k"), || async { Ok::<_, Infallible>(1) }).await.unwrap();

    assert_eq!(cache.backend().set_ttls(), vec![Some(hoard::DEFAULT_TTL)]);
    assert_eq!(custom.backend().set_ttls(), vec![Some(Duration::from_secs(30))]);
}

#[tokio::test(start_paused = true)]
async fn expired_entries_are_recomputed() {
    let cache = cache();
    let options = CacheOptions::new("k").ttl(Duration::from_secs(10));

    cache.get_or_set(options.clone(), || async { Ok::<_, Infallible>(1) }).await.unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;
    let value = cache.get_or_set(options, || async { Ok::<_, Infallible>(2) }).await.unwrap();

    assert_eq!(value, 2);
    assert_eq!(cache.stats(), stats(0, 2, 0));
}

#[tokio::test]
async fn get_or_set_wraps_factory_errors() {
    let cache = cache();

    let error = cache
        .get_or_set(CacheOptions::<_, u32>::new("k"), || async { Err(std::io::Error::other("registry down")) })
        .await
        .unwrap_err();

    assert!(error.is_factory());
    assert_eq!(error.factory_error::<std::io::Error>().map(ToString::to_string).as_deref(), Some("registry down"));
}

#[tokio::test]
async fn backend_lookup_failure_is_reported_and_counted_as_miss() {
    let cache = cache();
    cache.backend().fail_when(|op| matches!(op, BackendOp::Get { .. }));
    let calls = AtomicUsize::new(0);

    let calls_ref = &calls;
    let outcome = cache
        .get_or_set_either(CacheOptions::new("k"), move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Ok::<u32, FetchError>(1)
        })
        .await;

    assert!(matches!(outcome, Err(FetchError::Cache(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(cache.stats(), stats(0, 1, 0));
}

/// A backend whose lookups take a while and then fail.
#[derive(Debug)]
struct SlowFailingBackend;

impl CacheBackend for SlowFailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, Error> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err(Error::from_message("disk unavailable"))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Option<Duration>) -> Result<bool, Error> {
        Ok(true)
    }
}

#[tokio::test(start_paused = true)]
async fn backend_lookup_failure_is_shared_with_followers() {
    let cache = CoalescingCache::builder(SlowFailingBackend).logs(false).build();

    let outcomes = join_all(
        (0..3).map(|_| cache.get_or_set_either(CacheOptions::new("k"), || async { Ok::<u32, FetchError>(1) })),
    )
    .await;

    assert!(outcomes.iter().all(|outcome| matches!(outcome, Err(FetchError::Cache(message)) if message.contains("disk unavailable"))));
    assert_eq!(cache.stats(), stats(0, 1, 2));
}

#[tokio::test(start_paused = true)]
async fn backend_write_failure_fails_only_the_leader() {
    let cache = cache();
    cache.backend().fail_when(|op| matches!(op, BackendOp::Set { .. }));

    let outcomes = join_all((0..3).map(|_| {
        cache.get_or_set_either(CacheOptions::new("k"), || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<u32, FetchError>(7)
        })
    }))
    .await;

    assert!(matches!(outcomes[0], Err(FetchError::Cache(_))));
    assert_eq!(outcomes[1], Ok(7));
    assert_eq!(outcomes[2], Ok(7));
}

#[tokio::test(start_paused = true)]
async fn follower_takes_over_when_the_leader_is_dropped() {
    let cache = cache();
    let options = CacheOptions::new("k").ttl(Duration::from_secs(10));

    let mut leader = Box::pin(cache.get_or_set(options.clone(), || async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok::<_, Infallible>("leader".to_string())
    }));
    assert!(futures::poll!(&mut leader).is_pending());

    let mut follower = Box::pin(cache.get_or_set(options.clone(), || async { Ok::<_, Infallible>("follower".to_string()) }));
    assert!(futures::poll!(&mut follower).is_pending());
    assert_eq!(cache.stats(), stats(0, 1, 1));

    drop(leader);

    assert_eq!(follower.await.unwrap(), "follower");
    assert_eq!(cache.stats(), stats(0, 2, 0));
    assert_eq!(cache.in_flight(), 0);

    let cached = cache.get_or_set(options, || async { Ok::<_, Infallible>("late".to_string()) }).await.unwrap();
    assert_eq!(cached, "follower");
}

#[tokio::test(start_paused = true)]
async fn noop_backend_still_coalesces_concurrent_calls() {
    let cache = CoalescingCache::builder(NoopBackend).logs(false).build();
    let calls = AtomicUsize::new(0);

    let results = join_all((0..3).map(|_| {
        let calls = &calls;
        cache.get_or_set(CacheOptions::new("k"), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, Infallible>(1)
        })
    }))
    .await;
    assert!(results.iter().all(|result| *result.as_ref().unwrap() == 1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    cache.get_or_set(CacheOptions::new("k"), || async { Ok::<_, Infallible>(1) }).await.unwrap();
    assert_eq!(cache.stats(), stats(0, 2, 2));
}

#[tokio::test]
async fn cached_combinator_routes_through_the_cache() {
    let cache = cache();
    let latest = cache.cached(CacheOptions::new("latest").ttl(Duration::from_secs(60)));
    let polled = AtomicUsize::new(0);

    let first = latest
        .wrap(async {
            polled.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FetchError>("1.0.0".to_string())
        })
        .await;
    let second = latest
        .wrap(async {
            polled.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FetchError>("2.0.0".to_string())
        })
        .await;

    assert_eq!(first, Ok("1.0.0".to_string()));
    assert_eq!(second, Ok("1.0.0".to_string()));
    assert_eq!(polled.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats(), stats(1, 1, 0));
}

#[tokio::test]
async fn structured_keys_are_hashed_canonically() {
    #[derive(serde::Serialize)]
    struct PackageKey<'a> {
        registry: &'a str,
        name: &'a str,
    }

    let cache = cache();
    cache
        .get_or_set(CacheOptions::new(PackageKey { registry: "npm", name: "react" }), || async { Ok::<_, Infallible>(1) })
        .await
        .unwrap();
    let value = cache
        .get_or_set(CacheOptions::new(PackageKey { registry: "npm", name: "react" }), || async { Ok::<_, Infallible>(2) })
        .await
        .unwrap();

    assert_eq!(value, 1);
}

#[tokio::test]
async fn incompatible_stored_value_is_recomputed() {
    let cache = cache();

    cache.get_or_set(CacheOptions::new("k"), || async { Ok::<_, Infallible>(1_u32) }).await.unwrap();
    let value = cache
        .get_or_set(CacheOptions::new("k"), || async { Ok::<_, Infallible>(vec!["a".to_string()]) })
        .await
        .unwrap();

    assert_eq!(value, vec!["a".to_string()]);
    assert_eq!(cache.stats(), stats(0, 2, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stats_account_for_every_call_under_contention() {
    const TASKS: u64 = 64;

    let cache = cache();
    let barrier = Arc::new(tokio::sync::Barrier::new(64));

    let handles: Vec<_> = (0..TASKS)
        .map(|i| {
            let cache = cache.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_set(CacheOptions::new(i % 4).ttl(Duration::from_secs(60)), || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, Infallible>(i % 4)
                    })
                    .await
            })
        })
        .collect();

    for (i, handle) in (0..TASKS).zip(handles) {
        assert_eq!(handle.await.unwrap().unwrap(), i % 4);
    }

    let stats = cache.stats();
    assert_eq!(stats.total(), TASKS);
    assert_eq!(stats.misses, 4);
    assert_eq!(cache.in_flight(), 0);
}

#[test]
fn cache_is_send_sync_and_futures_are_send() {
    static_assertions::assert_impl_all!(CoalescingCache<MockBackend>: Send, Sync, Clone);
    static_assertions::assert_impl_all!(hoard::Cached<MockBackend, String, u32>: Send, Sync, Clone);

    fn assert_send<T: Send>(_: &T) {}

    let cache = cache();
    let future = cache.get_or_set(CacheOptions::new("k"), || async { Ok::<_, Infallible>(1) });
    assert_send(&future);
}
