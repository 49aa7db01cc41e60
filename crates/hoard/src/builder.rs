// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`CoalescingCache`].

use std::{sync::Arc, time::Duration};

#[cfg(feature = "disk")]
use hoard_tier::{DynamicBackend, Error};
#[cfg(any(feature = "metrics", test))]
use opentelemetry::metrics::MeterProvider;

#[cfg(feature = "disk")]
use crate::CacheConfig;
use crate::{
    CoalescingCache, DEFAULT_TTL,
    cache::CacheInner,
    inflight::Registry,
    telemetry::CacheTelemetry,
};

/// Builder for a [`CoalescingCache`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hoard::{CoalescingCache, NoopBackend};
///
/// let cache = CoalescingCache::builder(NoopBackend)
///     .name("packages")
///     .default_ttl(Duration::from_secs(60))
///     .logs(false)
///     .build();
///
/// assert_eq!(cache.name(), "packages");
/// ```
#[derive(Debug)]
pub struct CoalescingCacheBuilder<B> {
    backend: B,
    name: &'static str,
    default_ttl: Duration,
    telemetry: CacheTelemetry,
}

impl<B> CoalescingCacheBuilder<B> {
    pub(crate) fn new(backend: B) -> Self {
        Self {
            backend,
            name: "hoard",
            default_ttl: DEFAULT_TTL,
            telemetry: CacheTelemetry::new(true),
        }
    }

    /// Sets the name reported in logs and metrics. Defaults to `"hoard"`.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Sets the time-to-live for calls that configure none, in place of [`DEFAULT_TTL`].
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Turns `cache.event` log events on or off. They are on by default.
    #[must_use]
    pub fn logs(mut self, enabled: bool) -> Self {
        self.telemetry = self.telemetry.with_logging(enabled);
        self
    }

    /// Counts cache events with an OpenTelemetry counter named `cache.event.count`.
    #[cfg(any(feature = "metrics", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn metrics(mut self, provider: &dyn MeterProvider) -> Self {
        self.telemetry = self.telemetry.with_meter_provider(provider);
        self
    }

    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> CoalescingCache<B> {
        CoalescingCache {
            inner: Arc::new(CacheInner {
                name: self.name,
                backend: self.backend,
                default_ttl: self.default_ttl,
                registry: Registry::default(),
                telemetry: self.telemetry,
            }),
        }
    }
}

#[cfg(feature = "disk")]
impl CoalescingCache<DynamicBackend> {
    /// Creates a cache from configuration.
    ///
    /// The backend is a [`TieredBackend`](hoard_disk::TieredBackend) over the
    /// configured directory, or a [`NoopBackend`](hoard_tier::NoopBackend) when
    /// caching is disabled. The configured TTL becomes the cache's default TTL.
    ///
    /// Must be called inside a Tokio runtime, which runs the pruning task.
    ///
    /// # Errors
    ///
    /// Returns an error if the tiered backend cannot be created.
    ///
    /// # Examples
    ///
    /// ```
    /// use hoard::{CacheConfig, CoalescingCache};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), hoard::Error> {
    /// # let dir = tempfile::tempdir().unwrap();
    /// let mut config = CacheConfig::default();
    /// config.directory = dir.path().to_path_buf();
    ///
    /// let cache = CoalescingCache::from_config("packages", &config)?;
    /// assert_eq!(cache.default_ttl(), config.ttl);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_config(name: &'static str, config: &CacheConfig) -> Result<Self, Error> {
        Ok(Self::builder(config.backend(name)?)
            .name(name)
            .default_ttl(config.ttl)
            .build())
    }
}
