// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A coalescing cache for expensive asynchronous computations.
//!
//! [`CoalescingCache`] makes a computation safe to call concurrently and
//! repeatedly:
//!
//! - **Single flight**: at most one computation runs per key. Concurrent callers
//!   for the same key wait for it and receive the identical outcome.
//! - **Persistence**: successful results are stored in a pluggable
//!   [`CacheBackend`], by default the two-tier memory and disk backend from
//!   `hoard_disk`.
//! - **No failure caching**: a failed computation is shared with the callers that
//!   waited for it but never stored, so the next call tries again.
//! - **Result-driven policy**: a [`Policy`] function can change the time-to-live
//!   or nil handling of a write based on the value that was computed.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use hoard::{CacheOptions, CoalescingCache};
//! use hoard_tier::testing::MockBackend;
//! # futures::executor::block_on(async {
//!
//! let cache = CoalescingCache::builder(MockBackend::new()).name("quick-start").build();
//! let options = CacheOptions::new(("npm", "left-pad")).ttl(Duration::from_secs(60));
//!
//! let first = cache.get_or_set(options.clone(), || async { Ok::<_, std::io::Error>("1.3.0".to_string()) }).await?;
//! let second = cache.get_or_set(options, || async { Ok::<_, std::io::Error>("never called".to_string()) }).await?;
//!
//! assert_eq!(first, second);
//! assert_eq!((cache.stats().misses, cache.stats().hits), (1, 1));
//! # Ok::<(), hoard::Error>(())
//! # });
//! ```
//!
//! # Nil Values
//!
//! A value that serializes to JSON `null`, such as `None`, is *nil*. Nil values are
//! returned to the caller but not stored unless nil caching is enabled, either on
//! the call with [`CacheOptions::cache_nil`] or from the value with a [`Policy`]:
//!
//! ```
//! use std::time::Duration;
//!
//! use hoard::{CacheOptions, Policy};
//!
//! // Remember that a package does not exist, but only for ten minutes.
//! let options = CacheOptions::new("no-such-package").policy(|info: &Option<String>| match info {
//!     Some(_) => Policy::default(),
//!     None => Policy::new().cache_nil(true).ttl(Duration::from_secs(600)),
//! });
//! ```
//!
//! # Backends
//!
//! - `TieredBackend` (feature `disk`, on by default): bounded memory in front of
//!   durable files, with background pruning.
//! - [`NoopBackend`]: stores nothing. Concurrent calls are still coalesced.
//! - [`testing::MockBackend`] (feature `test-util`): in-memory, records every
//!   operation and can inject failures.
//!
//! [`CacheConfig`] reads backend settings from the environment and
//! [`CoalescingCache::from_config`] builds a cache from them.

mod builder;
mod cache;
pub mod config;
mod inflight;
mod key;
mod options;
mod telemetry;

#[doc(inline)]
pub use builder::CoalescingCacheBuilder;
#[doc(inline)]
pub use cache::{CacheStats, Cached, CoalescingCache};
#[doc(inline)]
pub use config::CacheConfig;
#[cfg(feature = "disk")]
#[cfg_attr(docsrs, doc(cfg(feature = "disk")))]
#[doc(inline)]
pub use hoard_disk::{PruneReport, TieredBackend};
#[doc(inline)]
pub use hoard_tier::{CacheBackend, CachedValue, DynamicBackend, DynamicBackendExt, Error, NoopBackend, Result};
#[doc(inline)]
pub use key::CacheKey;
#[doc(inline)]
pub use options::{CacheOptions, DEFAULT_TTL, Policy};

/// Test doubles for exercising code that uses a [`CoalescingCache`].
#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing {
    #[doc(inline)]
    pub use hoard_tier::testing::{BackendOp, MockBackend};
}
