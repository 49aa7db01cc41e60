// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The coalescing cache.

use std::{fmt, sync::Arc, time::Duration};

use hoard_tier::{CacheBackend, CachedValue, Error};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    CacheKey, CacheOptions,
    builder::CoalescingCacheBuilder,
    inflight::{LeaderGuard, Registry, Role},
    telemetry::{CacheActivity, CacheTelemetry},
};

/// Counters describing how calls were served.
///
/// Every call that gets as far as computing its key is counted exactly once, so
/// `hits + misses + deferred` equals the number of such calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls whose leader found the value in the backend.
    pub hits: u64,
    /// Calls whose leader had to run the factory (or whose backend lookup failed).
    pub misses: u64,
    /// Calls that waited for another caller's result.
    pub deferred: u64,
}

impl CacheStats {
    /// Returns the number of calls counted so far.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.hits + self.misses + self.deferred
    }
}

/// A cache that runs at most one computation per key at a time.
///
/// The first caller for a key becomes its *leader*: it looks the key up in the
/// backend and, on a miss, runs the factory and stores the result. Callers that
/// arrive while the leader is busy become *followers* and receive exactly the
/// outcome the leader observed, success or failure, without touching the backend.
///
/// Failures are never stored, so the next call after a failure computes again. A
/// nil value (one that serializes to JSON `null`, such as `None`) is returned but
/// only stored when nil caching is enabled for the call.
///
/// Clones share the backend, the in-flight registry and the statistics.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hoard::{CacheOptions, CoalescingCache, NoopBackend};
/// # futures::executor::block_on(async {
///
/// let cache = CoalescingCache::builder(NoopBackend).name("docs").build();
///
/// let value = cache
///     .get_or_set(CacheOptions::new("answer").ttl(Duration::from_secs(10)), || async {
///         Ok::<_, std::io::Error>(42)
///     })
///     .await?;
///
/// assert_eq!(value, 42);
/// assert_eq!(cache.stats().misses, 1);
/// # Ok::<(), hoard::Error>(())
/// # });
/// ```
///
/// # Cancellation
///
/// Dropping a leader's future, or a panic in its factory, abandons the pending
/// result. Waiting followers then retry: the first one to do so becomes the new
/// leader and runs its own factory, and the others follow it.
pub struct CoalescingCache<B> {
    pub(crate) inner: Arc<CacheInner<B>>,
}

pub(crate) struct CacheInner<B> {
    pub(crate) name: &'static str,
    pub(crate) backend: B,
    pub(crate) default_ttl: Duration,
    pub(crate) registry: Registry,
    pub(crate) telemetry: CacheTelemetry,
}

impl<B> Clone for CoalescingCache<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: fmt::Debug> fmt::Debug for CoalescingCache<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoalescingCache")
            .field("name", &self.inner.name)
            .field("backend", &self.inner.backend)
            .field("default_ttl", &self.inner.default_ttl)
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

impl<B> CoalescingCache<B> {
    /// Creates a builder for a cache over `backend`.
    pub fn builder(backend: B) -> CoalescingCacheBuilder<B> {
        CoalescingCacheBuilder::new(backend)
    }

    /// Returns the cache name used in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Returns the time-to-live used when a call sets none.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// Returns a snapshot of the call counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.inner.registry.stats()
    }

    /// Returns the number of keys currently being computed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.registry.in_flight()
    }

    fn record(&self, key: &CacheKey, activity: CacheActivity) {
        self.inner.telemetry.record(self.inner.name, key, activity);
    }

    fn record_error(&self, key: &CacheKey, activity: CacheActivity, error: &Error) {
        self.inner.telemetry.record_error(self.inner.name, key, activity, error);
    }
}

impl<B: CacheBackend> CoalescingCache<B> {
    /// Returns the cached value for the options' key, computing it with `factory` on a miss.
    ///
    /// The outcome is returned as a value: a factory failure comes back as `Err`
    /// and is never stored. Backend failures are reported through the same
    /// channel, converted with `E: From<Error>`.
    ///
    /// # Errors
    ///
    /// Returns the factory's error, or a converted [`Error`] if the key cannot be
    /// encoded, the backend fails, or the value cannot be encoded for storage.
    ///
    /// # Examples
    ///
    /// ```
    /// use hoard::{CacheOptions, CoalescingCache, Error, NoopBackend};
    /// # futures::executor::block_on(async {
    ///
    /// #[derive(Clone, Debug)]
    /// enum FetchError {
    ///     NotReachable,
    ///     Cache(Error),
    /// }
    ///
    /// impl From<Error> for FetchError {
    ///     fn from(error: Error) -> Self {
    ///         Self::Cache(error)
    ///     }
    /// }
    ///
    /// let cache = CoalescingCache::builder(NoopBackend).build();
    /// let outcome = cache
    ///     .get_or_set_either(CacheOptions::<_, u32>::new("k"), || async { Err(FetchError::NotReachable) })
    ///     .await;
    ///
    /// assert!(matches!(outcome, Err(FetchError::NotReachable)));
    /// # });
    /// ```
    pub async fn get_or_set_either<K, A, E, F, Fut>(&self, options: CacheOptions<K, A>, factory: F) -> Result<A, E>
    where
        K: Serialize,
        A: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        E: From<Error> + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<A, E>>,
    {
        let key = CacheKey::new(options.namespace.as_deref(), &options.key)?;
        let registry = &self.inner.registry;
        let mut retried = false;

        let leader = loop {
            match registry.join::<A, E>(&key) {
                Role::Leader(leader) => break leader,
                Role::Follower(mut receiver) => {
                    self.record(&key, CacheActivity::Deferred);
                    let outcome = receiver.wait_for(Option::is_some).await.map(|outcome| outcome.clone());
                    if let Ok(Some(outcome)) = outcome {
                        return outcome;
                    }

                    // The leader went away without settling; try again.
                    registry.withdraw_deferred();
                    retried = true;
                }
            }
        };

        if retried {
            self.record(&key, CacheActivity::Promoted);
        }

        self.lead(leader, &key, &options, factory).await
    }

    /// Like [`get_or_set_either`](Self::get_or_set_either), but wraps a factory
    /// error into [`Error::Factory`].
    ///
    /// The original error can be recovered with [`Error::factory_error`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Factory`] if the factory fails, or the cache's own error
    /// if the key, the backend or the value encoding fails.
    pub async fn get_or_set<K, A, E, F, Fut>(&self, options: CacheOptions<K, A>, factory: F) -> Result<A, Error>
    where
        K: Serialize,
        A: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<A, E>>,
    {
        self.get_or_set_either(options, move || async move { factory().await.map_err(Error::factory) })
            .await
    }

    /// Returns a combinator that routes computations through this cache.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use hoard::{CacheOptions, CoalescingCache, Error, NoopBackend};
    /// # futures::executor::block_on(async {
    ///
    /// let cache = CoalescingCache::builder(NoopBackend).build();
    /// let latest = cache.cached(CacheOptions::new("latest-version").ttl(Duration::from_secs(60)));
    ///
    /// let version = latest.wrap(async { Ok::<_, Error>("1.2.3".to_string()) }).await?;
    /// assert_eq!(version, "1.2.3");
    /// # Ok::<(), Error>(())
    /// # });
    /// ```
    pub fn cached<K, A>(&self, options: CacheOptions<K, A>) -> Cached<B, K, A> {
        Cached {
            cache: self.clone(),
            options,
        }
    }

    async fn lead<K, A, E, F, Fut>(
        &self,
        leader: LeaderGuard<'_, A, E>,
        key: &CacheKey,
        options: &CacheOptions<K, A>,
        factory: F,
    ) -> Result<A, E>
    where
        A: Serialize + DeserializeOwned + Clone,
        E: From<Error> + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<A, E>>,
    {
        let registry = &self.inner.registry;

        match self.inner.backend.get(key.as_str()).await {
            Ok(Some(bytes)) => match CachedValue::<A>::decode(&bytes) {
                Ok(cached) => {
                    registry.record_hit();
                    self.record(key, CacheActivity::Hit);
                    let value = cached.into_inner();
                    leader.settle(Ok(value.clone()));
                    return Ok(value);
                }
                // Written by an incompatible version of the value type; recompute and overwrite.
                Err(e) => self.record_error(key, CacheActivity::Invalid, &e),
            },
            Ok(None) => {}
            Err(e) => {
                registry.record_miss();
                self.record_error(key, CacheActivity::Error, &e);
                let error = E::from(e);
                leader.settle(Err(error.clone()));
                return Err(error);
            }
        }

        registry.record_miss();
        self.record(key, CacheActivity::Miss);

        let outcome = factory().await;
        leader.settle(outcome.clone());

        let value = match outcome {
            Ok(value) => value,
            Err(error) => {
                self.record(key, CacheActivity::FactoryFailed);
                return Err(error);
            }
        };

        self.store(key, options, &value).await.map_err(E::from)?;
        Ok(value)
    }

    async fn store<K, A>(&self, key: &CacheKey, options: &CacheOptions<K, A>, value: &A) -> Result<(), Error>
    where
        A: Serialize,
    {
        let (ttl, cache_nil) = options.resolve(value, self.inner.default_ttl);

        let encoded = match CachedValue::encode(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.record_error(key, CacheActivity::Error, &e);
                return Err(e);
            }
        };

        if encoded.is_nil() && !cache_nil {
            self.record(key, CacheActivity::NilSkipped);
            return Ok(());
        }

        match self.inner.backend.set(key.as_str(), encoded.into_bytes(), Some(ttl)).await {
            Ok(stored) => {
                if stored {
                    self.record(key, CacheActivity::Stored);
                }
                Ok(())
            }
            Err(e) => {
                self.record_error(key, CacheActivity::Error, &e);
                Err(e)
            }
        }
    }
}

/// A computation decorator returned by [`CoalescingCache::cached`].
///
/// Each call to [`wrap`](Self::wrap) goes through
/// [`get_or_set_either`](CoalescingCache::get_or_set_either) with the stored
/// options and the given future as the factory. Futures are lazy, so the wrapped
/// future is never polled when the call is served from the backend or by
/// another caller.
pub struct Cached<B, K, A> {
    cache: CoalescingCache<B>,
    options: CacheOptions<K, A>,
}

impl<B, K: Clone, A> Clone for Cached<B, K, A> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            options: self.options.clone(),
        }
    }
}

impl<B: fmt::Debug, K: fmt::Debug, A> fmt::Debug for Cached<B, K, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cached")
            .field("cache", &self.cache)
            .field("options", &self.options)
            .finish()
    }
}

impl<B, K, A> Cached<B, K, A>
where
    B: CacheBackend,
    K: Serialize + Clone,
    A: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Runs `computation` through the cache.
    ///
    /// # Errors
    ///
    /// Same as [`CoalescingCache::get_or_set_either`].
    pub async fn wrap<E, Fut>(&self, computation: Fut) -> Result<A, E>
    where
        E: From<Error> + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<A, E>>,
    {
        self.cache.get_or_set_either(self.options.clone(), || computation).await
    }

    /// Returns the options every wrapped computation runs with.
    pub fn options(&self) -> &CacheOptions<K, A> {
        &self.options
    }
}
